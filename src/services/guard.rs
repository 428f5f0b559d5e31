//! Access guard
//!
//! Checks that a request carries a live session and that the session's
//! role is allowed. Expiry detection (`Session::status`) has no side
//! effects; the guard then removes expired or logged-out records itself.

use crate::db::repositories::SessionRepository;
use crate::models::{Role, Session, SessionStatus};
use crate::services::auth::AuthError;
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

pub struct AccessGuard {
    session_repo: Arc<dyn SessionRepository>,
    timeout: Duration,
}

impl AccessGuard {
    pub fn new(session_repo: Arc<dyn SessionRepository>, timeout: Duration) -> Self {
        Self {
            session_repo,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `token` to a live session and refresh its activity time.
    ///
    /// Expired sessions are destroyed and reported once as
    /// `SessionExpired`; afterwards the token is simply unknown.
    pub async fn require_session(&self, token: Option<&str>) -> Result<Session, AuthError> {
        let token = token.ok_or(AuthError::NotAuthenticated)?;

        let mut session = self
            .session_repo
            .get(token)
            .await
            .context("Failed to get session")?
            .ok_or(AuthError::NotAuthenticated)?;

        let now = Utc::now();
        match session.status(now, self.timeout) {
            SessionStatus::Active => {
                // A logout may have removed the record since the read above
                let refreshed = self
                    .session_repo
                    .touch(token, now)
                    .await
                    .context("Failed to refresh session")?;
                if !refreshed {
                    return Err(AuthError::NotAuthenticated);
                }
                session.touch(now);
                Ok(session)
            }
            SessionStatus::Expired => {
                tracing::info!(
                    user_id = session.user_id,
                    username = %session.username,
                    "Session expired"
                );
                self.reap(token).await?;
                Err(AuthError::SessionExpired)
            }
            SessionStatus::Invalid => {
                self.reap(token).await?;
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    /// `Forbidden` unless the session's role is one of `allowed`
    pub fn require_role(&self, session: &Session, allowed: &[Role]) -> Result<(), AuthError> {
        if Self::has_role(session, allowed) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = session.user_id,
                role = %session.role,
                "Access denied for role"
            );
            Err(AuthError::Forbidden)
        }
    }

    pub fn has_role(session: &Session, allowed: &[Role]) -> bool {
        allowed.contains(&session.role)
    }

    /// Delete every session idle for longer than the timeout
    pub async fn purge_idle(&self) -> Result<u64, AuthError> {
        let cutoff = Utc::now() - self.timeout;
        let removed = self
            .session_repo
            .delete_idle(cutoff)
            .await
            .context("Failed to delete idle sessions")?;
        if removed > 0 {
            tracing::info!(removed, "Purged idle sessions");
        }
        Ok(removed)
    }

    async fn reap(&self, token: &str) -> Result<(), AuthError> {
        self.session_repo
            .destroy(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }
}
