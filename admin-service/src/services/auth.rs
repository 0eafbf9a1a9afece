use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

use crate::{
    dtos::auth::LoginRequest,
    models::{AuditEvent, AuditEventType},
    permissions::PermissionService,
    services::{
        metrics::record_login, AuditSink, JwtService, ServiceError, TokenResponse, UserDirectory,
    },
    utils::{burn_password_verification, verify_password, Password, PasswordHashString},
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    permissions: PermissionService,
    jwt: JwtService,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        permissions: PermissionService,
        jwt: JwtService,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            users,
            permissions,
            jwt,
            audit,
        }
    }

    /// Check credentials and issue a session token carrying the user's flattened
    /// leaf permissions as roles.
    #[instrument(skip(self, req), fields(username = %req.username))]
    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse, ServiceError> {
        let user = self
            .users
            .find_by_username(&req.username)
            .await
            .map_err(ServiceError::Database)?;

        let Some(user) = user else {
            burn_password_verification(&Password::new(req.password));
            self.reject(&req.username, "unknown_user").await;
            return Err(ServiceError::InvalidCredentials);
        };

        if verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(user.password_hash.clone()),
        )
        .is_err()
        {
            self.reject(&req.username, "bad_password").await;
            return Err(ServiceError::InvalidCredentials);
        }

        if user.is_blocked {
            self.reject(&req.username, "blocked").await;
            return Err(ServiceError::UserBlocked);
        }

        let roles: Vec<String> = self
            .permissions
            .effective_leaf_names(user.id)
            .await?
            .into_iter()
            .collect();

        let access_token = self
            .jwt
            .issue(user.id, &user.username, roles.clone())
            .map_err(ServiceError::Internal)?;

        record_login("success");
        tracing::info!(user_id = user.id, roles = roles.len(), "User logged in");
        self.audit_quietly(AuditEvent::user_action(
            user.username.clone(),
            AuditEventType::UserLogin,
            Some("user"),
            Some(user.id.to_string()),
            Some(json!({ "roles": roles.len() })),
        ))
        .await;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.session_ttl_seconds(),
            roles,
        })
    }

    async fn reject(&self, username: &str, reason: &str) {
        record_login("failed");
        tracing::warn!(username, reason, "Login rejected");
        self.audit_quietly(AuditEvent::user_action(
            username,
            AuditEventType::UserLoginFailed,
            Some("user"),
            None,
            Some(json!({ "reason": reason })),
        ))
        .await;
    }

    async fn audit_quietly(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            tracing::error!(error = %e, "Failed to write login audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::PermissionNode;
    use crate::permissions::InMemoryPermissionStore;
    use crate::services::{InMemoryAuditSink, InMemoryUserDirectory};

    struct Fixture {
        auth: AuthService,
        users: Arc<InMemoryUserDirectory>,
        permissions: PermissionService,
        audit: Arc<InMemoryAuditSink>,
        jwt: JwtService,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserDirectory::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let permissions =
            PermissionService::new(Arc::new(InMemoryPermissionStore::new()), audit.clone());
        let jwt = JwtService::new(&JwtConfig {
            secret: "login-test-secret-with-enough-bytes!!".to_string(),
            issuer: "admin-service".to_string(),
            session_ttl_minutes: 30,
        });
        Fixture {
            auth: AuthService::new(users.clone(), permissions.clone(), jwt.clone(), audit.clone()),
            users,
            permissions,
            audit,
            jwt,
        }
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn login_embeds_flattened_roles() {
        let f = fixture();
        let user_id = f.users.add_user("ops", "correct horse").unwrap();
        let admin = f
            .permissions
            .create(
                PermissionNode::composite(
                    0,
                    "Admin",
                    vec![
                        PermissionNode::leaf(0, "DeleteUser"),
                        PermissionNode::leaf(0, "CreateUser"),
                    ],
                ),
                "root",
            )
            .await
            .unwrap();
        f.permissions
            .assign_to_user(user_id, vec![admin], "root")
            .await
            .unwrap();

        let token = f.auth.login(login("ops", "correct horse")).await.unwrap();
        assert_eq!(token.roles, vec!["CreateUser", "DeleteUser"]);
        assert_eq!(token.expires_in, 1800);

        let claims = f.jwt.validate(&token.access_token).unwrap();
        assert!(claims.has_role("DeleteUser"));
        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(f.audit.events_of(AuditEventType::UserLogin).len(), 1);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let f = fixture();
        f.users.add_user("ops", "correct horse").unwrap();

        assert!(matches!(
            f.auth.login(login("ops", "battery staple")).await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            f.auth.login(login("nobody", "x")).await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert_eq!(f.audit.events_of(AuditEventType::UserLoginFailed).len(), 2);
    }

    #[tokio::test]
    async fn blocked_user_is_refused() {
        let f = fixture();
        let id = f.users.add_user("ops", "correct horse").unwrap();
        f.users.set_blocked(id, true);

        assert!(matches!(
            f.auth.login(login("ops", "correct horse")).await,
            Err(ServiceError::UserBlocked)
        ));
    }
}
