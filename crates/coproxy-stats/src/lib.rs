//! Thread-safe request counters and derived health reporting for the proxy
//! server. Owns no I/O; the HTTP layer calls in on every handled request.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub health: Health,
    pub uptime_secs: Option<i64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_request_time: Option<OffsetDateTime>,
    pub running: bool,
    pub host: String,
    pub port: u16,
}

struct Inner {
    total_requests: u64,
    failed_requests: u64,
    start_time: Option<OffsetDateTime>,
    last_request_time: Option<OffsetDateTime>,
    running: bool,
    host: String,
    port: u16,
}

/// Counters and lifecycle flags for one running (or not-yet-started) proxy
/// server instance.
pub struct ProxyStats {
    inner: RwLock<Inner>,
}

impl Default for ProxyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyStats {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                total_requests: 0,
                failed_requests: 0,
                start_time: None,
                last_request_time: None,
                running: false,
                host: String::new(),
                port: 0,
            }),
        }
    }

    pub async fn mark_started(&self, host: impl Into<String>, port: u16) {
        let mut guard = self.inner.write().await;
        guard.running = true;
        guard.host = host.into();
        guard.port = port;
        guard.start_time = Some(OffsetDateTime::now_utc());
    }

    pub async fn mark_stopped(&self) {
        let mut guard = self.inner.write().await;
        guard.running = false;
    }

    /// Records one handled request. `failed` also increments
    /// `total_requests` — a handled upstream failure still counts as a
    /// request the proxy served, just unsuccessfully.
    pub async fn record_request(&self, failed: bool) {
        let mut guard = self.inner.write().await;
        guard.total_requests += 1;
        if failed {
            guard.failed_requests += 1;
        }
        guard.last_request_time = Some(OffsetDateTime::now_utc());
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let guard = self.inner.read().await;
        let total = guard.total_requests;
        let failed = guard.failed_requests;
        let success_rate = if total == 0 {
            1.0
        } else {
            (total - failed) as f64 / total as f64
        };
        let error_rate = 1.0 - success_rate;
        let health = if error_rate < 0.10 {
            Health::Healthy
        } else if error_rate < 0.50 {
            Health::Degraded
        } else {
            Health::Unhealthy
        };
        let uptime_secs = guard
            .start_time
            .map(|start| (OffsetDateTime::now_utc() - start).whole_seconds());

        StatsSnapshot {
            total_requests: total,
            failed_requests: failed,
            success_rate,
            health,
            uptime_secs,
            last_request_time: guard.last_request_time,
            running: guard.running,
            host: guard.host.clone(),
            port: guard.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn success_rate_is_one_when_no_requests() {
        let stats = ProxyStats::new();
        assert_eq!(stats.snapshot().await.success_rate, 1.0);
    }

    #[tokio::test]
    async fn failed_never_exceeds_total() {
        let stats = ProxyStats::new();
        stats.record_request(true).await;
        stats.record_request(false).await;
        let snap = stats.snapshot().await;
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert!(snap.failed_requests <= snap.total_requests);
    }

    #[tokio::test]
    async fn health_tiers_follow_error_rate_thresholds() {
        let stats = ProxyStats::new();
        for _ in 0..9 {
            stats.record_request(false).await;
        }
        stats.record_request(true).await;
        assert_eq!(stats.snapshot().await.health, Health::Healthy);

        let stats = ProxyStats::new();
        for _ in 0..5 {
            stats.record_request(false).await;
        }
        for _ in 0..5 {
            stats.record_request(true).await;
        }
        assert_eq!(stats.snapshot().await.health, Health::Degraded);

        let stats = ProxyStats::new();
        for _ in 0..6 {
            stats.record_request(true).await;
        }
        for _ in 0..4 {
            stats.record_request(false).await;
        }
        assert_eq!(stats.snapshot().await.health, Health::Unhealthy);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_exact() {
        let stats = Arc::new(ProxyStats::new());
        let threads = 8;
        let per_thread = 200;
        let mut handles = Vec::new();
        for _ in 0..threads {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..per_thread {
                    stats.record_request(false).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(
            stats.snapshot().await.total_requests,
            threads * per_thread as u64
        );
    }
}
