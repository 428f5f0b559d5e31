//! Data models
//!
//! This module contains the data structures of the authentication core:
//! - Database entities (User, Session, LoginAttempt)
//! - Request-side context (ClientInfo)

mod login_attempt;
mod session;
mod user;

pub use login_attempt::{ClientInfo, LoginAttempt};
pub use session::{Session, SessionStatus};
pub use user::{Role, User, UserRecord};
