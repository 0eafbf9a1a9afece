pub mod audit_event;
pub mod customer;
pub mod integrity;
pub mod order;
pub mod permission;
pub mod product;
pub mod user;

pub use audit_event::{AuditEvent, AuditEventType};
pub use customer::Customer;
pub use integrity::{
    HorizontalDigest, IntegrityReport, RecalculationSummary, TableError, Violation, ViolationKind,
};
pub use order::{Order, OrderItem};
pub use permission::{PermissionEdge, PermissionNode, PermissionRecord, UserPermissions};
pub use product::Product;
pub use user::AdminUser;
