//! Services layer - Business logic
//!
//! - `auth`: credential verification, session issue, logout, password change
//! - `guard`: session liveness and role checks
//! - `password`: Argon2id hashing

pub mod auth;
pub mod guard;
pub mod password;

pub use auth::{AuthError, AuthService, Login, LoginCredentials};
pub use guard::AccessGuard;
pub use password::{hash_password, verify_password};
