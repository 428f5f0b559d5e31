//! Failed login attempt model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rejected login, kept for abuse monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// Username as submitted (may not exist)
    pub username: String,
    /// Source address of the request
    pub ip_address: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl LoginAttempt {
    pub fn new(username: impl Into<String>, client: &ClientInfo, attempted_at: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
            attempted_at,
        }
    }
}
