pub mod password;

pub use password::{
    burn_password_verification, hash_password, verify_password, Password, PasswordHashString,
};
