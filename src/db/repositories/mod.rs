//! Database repositories
//!
//! Repository pattern implementations for the credential, session and
//! login-attempt stores.

pub mod login_attempt;
pub mod memory;
pub mod session;
pub mod user;

pub use login_attempt::{LoginAttemptRepository, SqlxLoginAttemptRepository};
pub use memory::{MemoryLoginAttemptRepository, MemorySessionRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
