//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Role, User};

/// Server-side session created by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token sent to the client as a cookie)
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Username at login time
    pub username: String,
    /// Display name at login time
    pub full_name: String,
    /// Role claim cached at login time
    pub role: Role,
    /// False means the record no longer authorizes anything
    pub logged_in: bool,
    /// When the session was created
    pub login_time: DateTime<Utc>,
    /// Last validated access
    pub last_activity: DateTime<Utc>,
}

/// Outcome of inspecting a session without touching it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Logged in and within the inactivity window
    Active,
    /// Logged in but idle past the timeout
    Expired,
    /// Missing identity or logged-out flag
    Invalid,
}

impl Session {
    /// Start a session for `user` with a freshly generated token
    pub fn start(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            logged_in: true,
            login_time: now,
            last_activity: now,
        }
    }

    /// Classify the session at `now`. Pure: nothing is refreshed or destroyed.
    pub fn status(&self, now: DateTime<Utc>, timeout: Duration) -> SessionStatus {
        if !self.logged_in || self.user_id <= 0 {
            return SessionStatus::Invalid;
        }
        if now - self.last_activity > timeout {
            return SessionStatus::Expired;
        }
        SessionStatus::Active
    }

    /// Record an access at `now`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}
