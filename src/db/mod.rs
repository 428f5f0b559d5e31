//! Database layer
//!
//! SQLite is the default and keeps the whole app in a single file;
//! MySQL is available for shared deployments. The driver is picked from
//! `database.driver` in the configuration.
//!
//! # Usage
//!
//! ```ignore
//! use rollcall::config::DatabaseConfig;
//! use rollcall::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
