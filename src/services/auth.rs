//! Authentication service
//!
//! Verifies credentials against the user store, issues sessions, and
//! handles logout and password changes. Unknown usernames and wrong
//! passwords are indistinguishable to the caller.

use crate::db::repositories::{LoginAttemptRepository, SessionRepository, UserRepository};
use crate::models::{ClientInfo, LoginAttempt, Role, Session, User, UserRecord};
use crate::services::password::{hash_password, verify_dummy, verify_password};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 50;
pub const PASSWORD_MIN_LEN: usize = 6;

/// Errors surfaced by authentication and access checks
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown username or wrong password; the two are never distinguished
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session expired, please log in again")]
    SessionExpired,

    #[error("Authentication required")]
    NotAuthenticated,

    #[error("You do not have access to this page")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Submitted username and password
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Trim the username and check the form rules.
    pub fn validate(mut self) -> Result<Self, AuthError> {
        self.username = self.username.trim().to_string();

        let len = self.username.chars().count();
        if len < USERNAME_MIN_LEN || len > USERNAME_MAX_LEN {
            return Err(AuthError::Validation(format!(
                "Username must be between {} and {} characters",
                USERNAME_MIN_LEN, USERNAME_MAX_LEN
            )));
        }
        validate_password(&self.password)?;
        Ok(self)
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    Ok(())
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct Login {
    pub user: User,
    pub session: Session,
}

/// Authentication service
pub struct AuthService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    attempt_repo: Arc<dyn LoginAttemptRepository>,
}

impl AuthService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        attempt_repo: Arc<dyn LoginAttemptRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            attempt_repo,
        }
    }

    /// Verify credentials and start a new session.
    ///
    /// Expects input that already passed [`LoginCredentials::validate`].
    /// On success `last_login_at` is stamped and a session with a fresh
    /// token is stored. On failure nothing is created and the attempt is
    /// recorded.
    pub async fn authenticate(
        &self,
        credentials: &LoginCredentials,
        client: &ClientInfo,
    ) -> Result<Login, AuthError> {
        let record = self
            .user_repo
            .get_by_username(&credentials.username)
            .await
            .context("Failed to look up user")?;

        let verified = match &record {
            Some(record) => match verify_password(&credentials.password, &record.password_hash) {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::error!(username = %record.username, "Unreadable password hash: {:#}", e);
                    false
                }
            },
            None => verify_dummy(&credentials.password),
        };

        let record = match record {
            Some(record) if verified => record,
            _ => {
                self.record_failure(&credentials.username, client).await;
                return Err(AuthError::InvalidCredentials);
            }
        };

        let now = Utc::now();
        self.user_repo
            .touch_last_login(record.id, now)
            .await
            .context("Failed to update last login")?;

        let mut user = record.into_user();
        user.last_login_at = Some(now);

        let session = self.start_session(&user, now).await?;

        tracing::info!(
            user_id = user.id,
            username = %user.username,
            role = %user.role,
            ip = client.ip_address.as_deref().unwrap_or("-"),
            "User logged in"
        );

        Ok(Login { user, session })
    }

    /// End the session behind `token`. Missing or unknown tokens are fine.
    pub async fn logout(&self, token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = token else {
            return Ok(());
        };

        if let Some(session) = self
            .session_repo
            .get(token)
            .await
            .context("Failed to get session")?
        {
            tracing::info!(user_id = session.user_id, username = %session.username, "User logged out");
        }

        self.session_repo
            .destroy(token)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Change the password of the session's user.
    ///
    /// Every session of the user is destroyed and a new one is returned,
    /// so the caller must replace the client's token.
    pub async fn change_password(
        &self,
        session: &Session,
        current_password: &str,
        new_password: &str,
    ) -> Result<Session, AuthError> {
        validate_password(new_password)?;

        let record = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?
            .ok_or(AuthError::NotAuthenticated)?;

        let matches = verify_password(current_password, &record.password_hash)
            .context("Failed to verify password")?;
        if !matches {
            tracing::warn!(user_id = record.id, "Password change rejected: wrong current password");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let hash = hash_password(new_password)?;
        self.user_repo
            .update_password(record.id, &hash, now)
            .await
            .context("Failed to update password")?;

        let revoked = self
            .session_repo
            .destroy_by_user(record.id)
            .await
            .context("Failed to revoke sessions")?;

        let mut user = record.into_user();
        user.password_changed_at = Some(now);
        let session = self.start_session(&user, now).await?;

        tracing::info!(user_id = user.id, revoked, "Password changed");
        Ok(session)
    }

    /// Fresh copy of the user behind a session
    pub async fn current_user(&self, session: &Session) -> Result<User, AuthError> {
        let record = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?
            .ok_or(AuthError::NotAuthenticated)?;
        Ok(record.into_user())
    }

    /// Create the first admin account when no users exist.
    ///
    /// Returns `None` when the user table already has rows.
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<Option<User>, AuthError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        if count > 0 {
            return Ok(None);
        }

        let credentials = LoginCredentials::new(username, password).validate()?;
        let record = UserRecord::new(
            credentials.username,
            hash_password(&credentials.password)?,
            full_name.to_string(),
            Role::Admin,
        );
        let created = self
            .user_repo
            .create(&record)
            .await
            .context("Failed to create admin user")?;

        tracing::info!(username = %created.username, "Created bootstrap admin account");
        Ok(Some(created.into_user()))
    }

    /// Failed logins for `username` since `since`
    pub async fn recent_failures(
        &self,
        username: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AuthError> {
        Ok(self
            .attempt_repo
            .count_recent_failures(username, since)
            .await
            .context("Failed to count login attempts")?)
    }

    /// Latest failed attempts across all usernames, newest first
    pub async fn recent_attempts(&self, limit: i64) -> Result<Vec<LoginAttempt>, AuthError> {
        Ok(self
            .attempt_repo
            .recent(limit)
            .await
            .context("Failed to list login attempts")?)
    }

    async fn start_session(&self, user: &User, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let session = Session::start(user, now);
        self.session_repo
            .put(&session)
            .await
            .context("Failed to create session")?;
        Ok(session)
    }

    async fn record_failure(&self, username: &str, client: &ClientInfo) {
        tracing::warn!(
            username = %username,
            ip = client.ip_address.as_deref().unwrap_or("-"),
            "Failed login attempt"
        );

        let attempt = LoginAttempt::new(username, client, Utc::now());
        if let Err(e) = self.attempt_repo.record(&attempt).await {
            tracing::error!("Failed to record login attempt: {:#}", e);
        }
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn username_length_rule(name in "[a-z0-9_]{0,60}") {
            let result = LoginCredentials::new(name.clone(), "secret1").validate();
            let ok = (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&name.len());
            prop_assert_eq!(result.is_ok(), ok);
        }

        #[test]
        fn password_length_rule(password in ".{0,12}") {
            let result = LoginCredentials::new("admin", password.clone()).validate();
            prop_assert_eq!(result.is_ok(), password.chars().count() >= PASSWORD_MIN_LEN);
        }
    }
}
