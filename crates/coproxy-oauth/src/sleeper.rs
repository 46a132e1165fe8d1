//! Indirection over "sleep between poll attempts" so tests can assert on the
//! exact interval sequence (including `slow_down` back-off) without a real
//! wall-clock wait.

use async_trait::async_trait;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep_secs(&self, secs: u64);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep_secs(&self, secs: u64) {
        tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
    }
}
