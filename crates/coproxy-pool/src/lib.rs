//! Thread-safe registry of upstream credentials with per-credential quota
//! state. This is the rotation engine: callers ask for "the current token"
//! and never see exhausted credentials until their quota is refreshed.
//!
//! All public operations take the pool's lock for their full duration and
//! never perform I/O while holding it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("unknown token")]
    UnknownToken,
}

/// One upstream access credential and its quota bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub quota_remaining: i64,
    pub quota_total: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used: Option<OffsetDateTime>,
}

impl Credential {
    /// Mirrors `quota_remaining <= 0`; the authoritative gate for selection.
    pub fn is_exhausted(&self) -> bool {
        self.quota_remaining <= 0
    }
}

/// A point-in-time, fully-owned copy of one credential's public state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialView {
    pub token: String,
    pub quota_remaining: i64,
    pub quota_total: i64,
    pub is_exhausted: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used: Option<OffsetDateTime>,
}

impl From<&Credential> for CredentialView {
    fn from(c: &Credential) -> Self {
        Self {
            token: c.token.clone(),
            quota_remaining: c.quota_remaining,
            quota_total: c.quota_total,
            is_exhausted: c.is_exhausted(),
            last_used: c.last_used,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStatistics {
    pub total: usize,
    pub available: usize,
    pub exhausted: usize,
}

struct Inner {
    by_token: HashMap<String, Credential>,
    // Insertion order; `get_current` walks this to implement "first
    // available" rotation. `add` on an existing token does not move it.
    order: Vec<String>,
}

/// Concurrent, insertion-ordered set of credentials.
pub struct CredentialPool {
    inner: RwLock<Inner>,
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialPool {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_token: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Inserts a new credential, or overwrites quotas (and resets
    /// `last_used`) if the token is already present. Never duplicates an
    /// entry in insertion order.
    pub async fn add(
        &self,
        token: impl Into<String>,
        quota_remaining: i64,
        quota_total: i64,
    ) -> Result<(), PoolError> {
        let token = token.into();
        validate_token(&token)?;

        let mut guard = self.inner.write().await;
        if !guard.by_token.contains_key(&token) {
            guard.order.push(token.clone());
        }
        guard.by_token.insert(
            token.clone(),
            Credential {
                token,
                quota_remaining,
                quota_total,
                last_used: None,
            },
        );
        Ok(())
    }

    pub async fn mark_exhausted(&self, token: &str) -> Result<(), PoolError> {
        let mut guard = self.inner.write().await;
        let cred = guard
            .by_token
            .get_mut(token)
            .ok_or(PoolError::UnknownToken)?;
        cred.quota_remaining = 0;
        Ok(())
    }

    pub async fn update_quota(
        &self,
        token: &str,
        remaining: i64,
        total: Option<i64>,
    ) -> Result<(), PoolError> {
        let mut guard = self.inner.write().await;
        let cred = guard
            .by_token
            .get_mut(token)
            .ok_or(PoolError::UnknownToken)?;
        cred.quota_remaining = remaining;
        if let Some(total) = total {
            cred.quota_total = total;
        }
        Ok(())
    }

    /// Returns the first non-exhausted token in insertion order, updating
    /// its `last_used` to now. Returns `None` when every credential is
    /// exhausted (or the pool is empty).
    pub async fn get_current(&self) -> Option<String> {
        let mut guard = self.inner.write().await;
        let token = guard
            .order
            .iter()
            .find(|t| {
                guard
                    .by_token
                    .get(*t)
                    .is_some_and(|c| !c.is_exhausted())
            })
            .cloned()?;
        if let Some(cred) = guard.by_token.get_mut(&token) {
            cred.last_used = Some(OffsetDateTime::now_utc());
        }
        Some(token)
    }

    pub async fn statistics(&self) -> PoolStatistics {
        let guard = self.inner.read().await;
        let total = guard.order.len();
        let exhausted = guard
            .order
            .iter()
            .filter(|t| guard.by_token.get(*t).is_some_and(|c| c.is_exhausted()))
            .count();
        PoolStatistics {
            total,
            available: total - exhausted,
            exhausted,
        }
    }

    pub async fn available_count(&self) -> usize {
        self.statistics().await.available
    }

    pub async fn total_count(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Deep copy of every credential, in insertion order.
    pub async fn snapshot(&self) -> Vec<CredentialView> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .filter_map(|t| guard.by_token.get(t).map(CredentialView::from))
            .collect()
    }
}

/// Token format: opaque string, length >= 20, alphanumerics and `_` only.
pub fn validate_token(token: &str) -> Result<(), PoolError> {
    if token.len() < 20 {
        return Err(PoolError::InvalidToken(
            "token must be at least 20 characters".to_string(),
        ));
    }
    if !token.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(PoolError::InvalidToken(
            "token may only contain letters, digits, and underscores".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(seed: char) -> String {
        std::iter::repeat(seed).take(24).collect()
    }

    #[tokio::test]
    async fn rotation_follows_insertion_order() {
        let pool = CredentialPool::new();
        let t1 = tok('a');
        let t2 = tok('b');
        pool.add(&t1, 100, 100).await.unwrap();
        pool.add(&t2, 100, 100).await.unwrap();

        assert_eq!(pool.get_current().await, Some(t1.clone()));
        pool.mark_exhausted(&t1).await.unwrap();
        assert_eq!(pool.get_current().await, Some(t2.clone()));
        pool.mark_exhausted(&t2).await.unwrap();
        assert_eq!(pool.get_current().await, None);
    }

    #[tokio::test]
    async fn add_is_idempotent_on_token_identity() {
        let pool = CredentialPool::new();
        let t = tok('c');
        pool.add(&t, 10, 10).await.unwrap();
        pool.add(&t, 5, 10).await.unwrap();
        assert_eq!(pool.total_count().await, 1);
        assert_eq!(pool.statistics().await.total, 1);
    }

    #[tokio::test]
    async fn mark_exhausted_rejects_unknown_token() {
        let pool = CredentialPool::new();
        let err = pool.mark_exhausted("whatever").await.unwrap_err();
        assert!(matches!(err, PoolError::UnknownToken));
    }

    #[tokio::test]
    async fn add_rejects_malformed_token() {
        let pool = CredentialPool::new();
        let err = pool.add("short", 1, 1).await.unwrap_err();
        assert!(matches!(err, PoolError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn statistics_add_up() {
        let pool = CredentialPool::new();
        pool.add(tok('d'), 10, 10).await.unwrap();
        pool.add(tok('e'), 0, 10).await.unwrap();
        let stats = pool.statistics().await;
        assert_eq!(stats.total, stats.available + stats.exhausted);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.exhausted, 1);
    }

    #[tokio::test]
    async fn update_quota_can_reinstate() {
        let pool = CredentialPool::new();
        let t = tok('f');
        pool.add(&t, 10, 10).await.unwrap();
        pool.mark_exhausted(&t).await.unwrap();
        assert_eq!(pool.get_current().await, None);
        pool.update_quota(&t, 5, None).await.unwrap();
        assert_eq!(pool.get_current().await, Some(t));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_current_never_returns_exhausted() {
        let pool = std::sync::Arc::new(CredentialPool::new());
        pool.add(tok('g'), 3, 3).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.get_current().await }));
        }
        for h in handles {
            if let Some(token) = h.await.unwrap() {
                let stats = pool.statistics().await;
                assert!(stats.available <= stats.total);
                let _ = token;
            }
        }
    }
}
