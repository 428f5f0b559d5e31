//! In-process stores
//!
//! Used when `session.store: memory` is configured and in tests. State is
//! lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{LoginAttemptRepository, SessionRepository};
use crate::models::{LoginAttempt, Session};

/// Session store backed by a `HashMap` keyed by token
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Arc<dyn SessionRepository> {
        Arc::new(Self::new())
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn touch(&self, id: &str, last_activity: DateTime<Utc>) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) if session.logged_in => {
                session.last_activity = last_activity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn destroy_by_user(&self, user_id: i64) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_idle(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.retain(|_, session| session.last_activity >= before);
        Ok((count - sessions.len()) as u64)
    }
}

/// Append-only list of failed attempts
#[derive(Default)]
pub struct MemoryLoginAttemptRepository {
    attempts: RwLock<Vec<LoginAttempt>>,
}

impl MemoryLoginAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Arc<dyn LoginAttemptRepository> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LoginAttemptRepository for MemoryLoginAttemptRepository {
    async fn record(&self, attempt: &LoginAttempt) -> Result<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }

    async fn count_recent_failures(&self, username: &str, since: DateTime<Utc>) -> Result<i64> {
        let attempts = self.attempts.read().await;
        Ok(attempts
            .iter()
            .filter(|a| a.username == username && a.attempted_at >= since)
            .count() as i64)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<LoginAttempt>> {
        let mut attempts = self.attempts.read().await.clone();
        attempts.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at));
        attempts.truncate(limit.max(0) as usize);
        Ok(attempts)
    }
}
