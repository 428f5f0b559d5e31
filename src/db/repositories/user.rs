//! User repository
//!
//! Credential store: reads and updates rows of the `users` table.
//! Callers get `UserRecord`s (with hash) and are expected to convert them
//! with `into_user` before anything leaves the authentication core.

use crate::db::DynDatabasePool;
use crate::models::{Role, UserRecord};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user and return it with its assigned id
    async fn create(&self, user: &UserRecord) -> Result<UserRecord>;

    async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>>;

    /// Exact, case-sensitive username lookup
    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Stamp a successful login
    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Replace the password hash and stamp `password_changed_at`
    async fn update_password(&self, id: i64, password_hash: &str, at: DateTime<Utc>)
        -> Result<()>;

    /// Count all users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &UserRecord) -> Result<UserRecord> {
        if let Some(pool) = self.pool.as_sqlite() {
            create_user_sqlite(pool, user).await
        } else if let Some(pool) = self.pool.as_mysql() {
            create_user_mysql(pool, user).await
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        if let Some(pool) = self.pool.as_sqlite() {
            get_user_by_id_sqlite(pool, id).await
        } else if let Some(pool) = self.pool.as_mysql() {
            get_user_by_id_mysql(pool, id).await
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        if let Some(pool) = self.pool.as_sqlite() {
            get_user_by_username_sqlite(pool, username).await
        } else if let Some(pool) = self.pool.as_mysql() {
            get_user_by_username_mysql(pool, username).await
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET last_login_at = ? WHERE id = ?";
        if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(sql)
                .bind(at)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update last login")?;
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(sql)
                .bind(at)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update last login")?;
        } else {
            anyhow::bail!("Unsupported database pool");
        }
        Ok(())
    }

    async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(pool) = self.pool.as_sqlite() {
            update_password_sqlite(pool, id, password_hash, at).await
        } else if let Some(pool) = self.pool.as_mysql() {
            update_password_mysql(pool, id, password_hash, at).await
        } else {
            anyhow::bail!("Unsupported database pool")
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM users";
        let count: i64 = if let Some(pool) = self.pool.as_sqlite() {
            sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .get("count")
        } else if let Some(pool) = self.pool.as_mysql() {
            sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?
                .get("count")
        } else {
            anyhow::bail!("Unsupported database pool")
        };
        Ok(count)
    }
}

const SELECT_USER: &str = r#"
    SELECT id, username, password_hash, full_name, role, created_at, last_login_at, password_changed_at
    FROM users
"#;

fn parse_role(role: &str) -> Result<Role> {
    Role::from_str(role).with_context(|| format!("Invalid role in database: {}", role))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &UserRecord) -> Result<UserRecord> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, full_name, role, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create user: {}", user.username))?;

    Ok(UserRecord {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<UserRecord>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_USER))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_username_sqlite(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<UserRecord>> {
    let row = sqlx::query(&format!("{} WHERE username = ?", SELECT_USER))
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_password_sqlite(
    pool: &SqlitePool,
    id: i64,
    password_hash: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, password_changed_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("User not found: {}", id);
    }
    Ok(())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role: parse_role(&role)?,
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
        password_changed_at: row.get("password_changed_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &UserRecord) -> Result<UserRecord> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, full_name, role, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create user: {}", user.username))?;

    Ok(UserRecord {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<UserRecord>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_USER))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_username_mysql(
    pool: &MySqlPool,
    username: &str,
) -> Result<Option<UserRecord>> {
    // BINARY keeps the match case-sensitive under the default collation
    let row = sqlx::query(&format!("{} WHERE BINARY username = ?", SELECT_USER))
        .bind(username)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_password_mysql(
    pool: &MySqlPool,
    id: i64,
    password_hash: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query("UPDATE users SET password_hash = ?, password_changed_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(at)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update password")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("User not found: {}", id);
    }
    Ok(())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role: parse_role(&role)?,
        created_at: row.get("created_at"),
        last_login_at: row.get("last_login_at"),
        password_changed_at: row.get("password_changed_at"),
    })
}
