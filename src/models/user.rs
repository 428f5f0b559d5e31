//! User model
//!
//! This module defines the User entity and related types for Rollcall.
//!
//! Two shapes exist on purpose: `UserRecord` is what the credential store
//! reads and still carries the password hash, `User` is what leaves the
//! authentication core and has no hash field at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User as seen by callers of the authentication core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique, login key)
    pub username: String,
    /// Display name
    pub full_name: String,
    /// User role
    pub role: Role,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,
    /// Last password change
    pub password_changed_at: Option<DateTime<Utc>>,
}

/// User row as stored in the `users` table, including the password hash.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    /// Password hash (argon2 PHC string)
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Create a new record ready for insertion.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(username: String, password_hash: String, full_name: String, role: Role) -> Self {
        Self {
            id: 0, // Will be set by the database
            username,
            password_hash,
            full_name,
            role,
            created_at: Utc::now(),
            last_login_at: None,
            password_changed_at: None,
        }
    }

    /// Drop the password hash and hand out the public view.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            full_name: self.full_name,
            role: self.role,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
            password_changed_at: self.password_changed_at,
        }
    }
}

/// User role for authorization.
///
/// The set is closed; every role has a landing page after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator - manages master data and users
    Admin,
    /// Teacher - takes attendance for their classes
    Teacher,
    /// Any other school staff with read access
    Staff,
}

impl Role {
    /// Every role, in privilege order
    pub const ALL: [Role; 3] = [Role::Admin, Role::Teacher, Role::Staff];

    /// Route a user with this role lands on after login
    pub fn landing_route(self) -> &'static str {
        match self {
            Role::Admin => "/admin/dashboard",
            Role::Teacher => "/teacher/dashboard",
            Role::Staff => "/dashboard",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Staff => "staff",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Staff
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            // Legacy rows store teachers as "guru"
            "teacher" | "guru" => Ok(Role::Teacher),
            "staff" => Ok(Role::Staff),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_record_new() {
        let record = UserRecord::new(
            "guru1".to_string(),
            "hashed_password".to_string(),
            "Siti Aminah".to_string(),
            Role::Teacher,
        );

        assert_eq!(record.id, 0);
        assert_eq!(record.username, "guru1");
        assert_eq!(record.role, Role::Teacher);
        assert!(record.last_login_at.is_none());
        assert!(record.password_changed_at.is_none());
    }

    #[test]
    fn test_into_user_drops_hash() {
        let mut record = UserRecord::new(
            "admin".to_string(),
            "$argon2id$secret".to_string(),
            "Admin".to_string(),
            Role::Admin,
        );
        record.id = 7;

        let user = record.into_user();
        assert_eq!(user.id, 7);
        assert_eq!(user.username, "admin");

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Teacher.to_string(), "teacher");
        assert_eq!(Role::Staff.to_string(), "staff");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("Teacher").unwrap(), Role::Teacher);
        assert_eq!(Role::from_str("guru").unwrap(), Role::Teacher);
        assert_eq!(Role::from_str("staff").unwrap(), Role::Staff);
        assert!(Role::from_str("student").is_err());
    }

    #[test]
    fn test_role_roundtrip_through_display() {
        for role in Role::ALL {
            assert_eq!(Role::from_str(&role.to_string()).unwrap(), role);
        }
    }

    #[test]
    fn test_landing_routes() {
        assert_eq!(Role::Admin.landing_route(), "/admin/dashboard");
        assert_eq!(Role::Teacher.landing_route(), "/teacher/dashboard");
        assert_eq!(Role::Staff.landing_route(), "/dashboard");
    }

    #[test]
    fn test_role_default() {
        assert_eq!(Role::default(), Role::Staff);
    }
}
