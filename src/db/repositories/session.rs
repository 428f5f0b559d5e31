//! Session repository
//!
//! Server-side session store keyed by the session token.
//!
//! This module provides:
//! - `SessionRepository` trait: get, put, touch, destroy, delete_idle
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! The in-process variant lives in `memory.rs`.

use crate::db::DynDatabasePool;
use crate::models::{Role, Session};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Get session by ID (token)
    async fn get(&self, id: &str) -> Result<Option<Session>>;

    /// Insert or replace the session with the same ID
    async fn put(&self, session: &Session) -> Result<()>;

    /// Set `last_activity` on a stored, logged-in session.
    ///
    /// Never inserts. Returns false when the session is gone or logged out.
    async fn touch(&self, id: &str, last_activity: DateTime<Utc>) -> Result<bool>;

    /// Delete a session. Unknown IDs are not an error.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user, returning how many were removed
    async fn destroy_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete sessions idle since before `before`, returning how many were removed
    async fn delete_idle(&self, before: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn get(&self, id: &str) -> Result<Option<Session>> {
        if let Some(pool) = self.pool.as_sqlite() {
            get_session_sqlite(pool, id).await
        } else if let Some(pool) = self.pool.as_mysql() {
            get_session_mysql(pool, id).await
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }

    async fn put(&self, session: &Session) -> Result<()> {
        if let Some(pool) = self.pool.as_sqlite() {
            put_session_sqlite(pool, session).await
        } else if let Some(pool) = self.pool.as_mysql() {
            put_session_mysql(pool, session).await
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }

    async fn touch(&self, id: &str, last_activity: DateTime<Utc>) -> Result<bool> {
        let sql = "UPDATE sessions SET last_activity = ? WHERE id = ? AND logged_in = ?";
        let affected = if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(sql)
                .bind(last_activity)
                .bind(id)
                .bind(true)
                .execute(pool)
                .await
                .context("Failed to refresh session")?
                .rows_affected()
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(sql)
                .bind(last_activity)
                .bind(id)
                .bind(true)
                .execute(pool)
                .await
                .context("Failed to refresh session")?
                .rows_affected()
        } else {
            anyhow::bail!("Unsupported database pool")
        };
        Ok(affected > 0)
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE id = ?";
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete session")?;
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete session")?;
        } else {
            anyhow::bail!("Unsupported database pool");
        }
        Ok(())
    }

    async fn destroy_by_user(&self, user_id: i64) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE user_id = ?";
        let affected = if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(sql)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected()
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(sql)
                .bind(user_id)
                .execute(pool)
                .await
                .context("Failed to delete sessions by user")?
                .rows_affected()
        } else {
            anyhow::bail!("Unsupported database pool")
        };
        Ok(affected)
    }

    async fn delete_idle(&self, before: DateTime<Utc>) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE last_activity < ?";
        let affected = if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(sql)
                .bind(before)
                .execute(pool)
                .await
                .context("Failed to delete idle sessions")?
                .rows_affected()
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(sql)
                .bind(before)
                .execute(pool)
                .await
                .context("Failed to delete idle sessions")?
                .rows_affected()
        } else {
            anyhow::bail!("Unsupported database pool")
        };
        Ok(affected)
    }
}

const SELECT_SESSION: &str = r#"
    SELECT id, user_id, username, full_name, role, logged_in, login_time, last_activity
    FROM sessions
    WHERE id = ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_session_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    row.as_ref().map(row_to_session_sqlite).transpose()
}

async fn put_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, username, full_name, role, logged_in, login_time, last_activity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            logged_in = excluded.logged_in,
            role = excluded.role,
            last_activity = excluded.last_activity
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(&session.username)
    .bind(&session.full_name)
    .bind(session.role.as_str())
    .bind(session.logged_in)
    .bind(session.login_time)
    .bind(session.last_activity)
    .execute(pool)
    .await
    .context("Failed to store session")?;

    Ok(())
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let role: String = row.get("role");
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        role: Role::from_str(&role)
            .with_context(|| format!("Invalid role in session: {}", role))?,
        logged_in: row.get("logged_in"),
        login_time: row.get("login_time"),
        last_activity: row.get("last_activity"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_session_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(SELECT_SESSION)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    row.as_ref().map(row_to_session_mysql).transpose()
}

async fn put_session_mysql(pool: &MySqlPool, session: &Session) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, username, full_name, role, logged_in, login_time, last_activity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            logged_in = VALUES(logged_in),
            role = VALUES(role),
            last_activity = VALUES(last_activity)
        "#,
    )
    .bind(&session.id)
    .bind(session.user_id)
    .bind(&session.username)
    .bind(&session.full_name)
    .bind(session.role.as_str())
    .bind(session.logged_in)
    .bind(session.login_time)
    .bind(session.last_activity)
    .execute(pool)
    .await
    .context("Failed to store session")?;

    Ok(())
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    let role: String = row.get("role");
    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        username: row.get("username"),
        full_name: row.get("full_name"),
        role: Role::from_str(&role)
            .with_context(|| format!("Invalid role in session: {}", role))?,
        logged_in: row.get("logged_in"),
        login_time: row.get("login_time"),
        last_activity: row.get("last_activity"),
    })
}
