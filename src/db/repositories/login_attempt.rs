//! Login attempt repository
//!
//! Failed logins are appended here for abuse monitoring. No lockout policy
//! is applied; `count_recent_failures` is what such a policy would consult.

use crate::db::DynDatabasePool;
use crate::models::LoginAttempt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    /// Append a failed attempt
    async fn record(&self, attempt: &LoginAttempt) -> Result<()>;

    /// Failed attempts for `username` at or after `since`
    async fn count_recent_failures(&self, username: &str, since: DateTime<Utc>) -> Result<i64>;

    /// Most recent attempts, newest first
    async fn recent(&self, limit: i64) -> Result<Vec<LoginAttempt>>;
}

/// SQLx-based login attempt repository
pub struct SqlxLoginAttemptRepository {
    pool: DynDatabasePool,
}

impl SqlxLoginAttemptRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LoginAttemptRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_ATTEMPT: &str = r#"
    INSERT INTO login_attempts (username, ip_address, user_agent, attempted_at)
    VALUES (?, ?, ?, ?)
"#;

const COUNT_RECENT: &str =
    "SELECT COUNT(*) as count FROM login_attempts WHERE username = ? AND attempted_at >= ?";

const SELECT_RECENT: &str = r#"
    SELECT username, ip_address, user_agent, attempted_at
    FROM login_attempts
    ORDER BY attempted_at DESC, id DESC
    LIMIT ?
"#;

#[async_trait]
impl LoginAttemptRepository for SqlxLoginAttemptRepository {
    async fn record(&self, attempt: &LoginAttempt) -> Result<()> {
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(INSERT_ATTEMPT)
                .bind(&attempt.username)
                .bind(&attempt.ip_address)
                .bind(&attempt.user_agent)
                .bind(attempt.attempted_at)
                .execute(pool)
                .await
                .context("Failed to record login attempt")?;
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(INSERT_ATTEMPT)
                .bind(&attempt.username)
                .bind(&attempt.ip_address)
                .bind(&attempt.user_agent)
                .bind(attempt.attempted_at)
                .execute(pool)
                .await
                .context("Failed to record login attempt")?;
        } else {
            anyhow::bail!("Unsupported database pool");
        }
        Ok(())
    }

    async fn count_recent_failures(&self, username: &str, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(COUNT_RECENT)
                .bind(username)
                .bind(since)
                .fetch_one(pool)
                .await
                .context("Failed to count login attempts")?
                .get("count")
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(COUNT_RECENT)
                .bind(username)
                .bind(since)
                .fetch_one(pool)
                .await
                .context("Failed to count login attempts")?
                .get("count")
        } else {
            anyhow::bail!("Unsupported database pool")
        };
        Ok(count)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LoginAttempt>> {
        if let Some(pool) = self.pool.as_sqlite() {
            let rows = sqlx::query(SELECT_RECENT)
                .bind(limit)
                .fetch_all(pool)
                .await
                .context("Failed to list login attempts")?;
            Ok(rows
                .iter()
                .map(|row| LoginAttempt {
                    username: row.get("username"),
                    ip_address: row.get("ip_address"),
                    user_agent: row.get("user_agent"),
                    attempted_at: row.get("attempted_at"),
                })
                .collect())
        } else if let Some(pool) = self.pool.as_mysql() {
            let rows = sqlx::query(SELECT_RECENT)
                .bind(limit)
                .fetch_all(pool)
                .await
                .context("Failed to list login attempts")?;
            Ok(rows
                .iter()
                .map(|row| LoginAttempt {
                    username: row.get("username"),
                    ip_address: row.get("ip_address"),
                    user_agent: row.get("user_agent"),
                    attempted_at: row.get("attempted_at"),
                })
                .collect())
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }
}
