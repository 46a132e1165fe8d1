//! Walks the cooldown store — a flat directory of one-token-per-file
//! credentials known to be exhausted — and reinstates any whose quota has
//! since reset.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use coproxy_config::{COOLDOWN_FILE_EXTENSION, DEFAULT_COOLDOWN_DIR};
use coproxy_pool::CredentialPool;

use crate::controller::OAuthController;

pub struct RecoveryScanner<'a> {
    controller: &'a OAuthController<'a>,
}

impl<'a> RecoveryScanner<'a> {
    pub fn new(controller: &'a OAuthController<'a>) -> Self {
        Self { controller }
    }

    /// Re-validates every file in `dir` (or the default cooldown store when
    /// `dir` is absent) and reinstates the ones with non-zero quota into
    /// `pool`. Errors reading or parsing one file never abort the scan; an
    /// inaccessible directory yields an empty result rather than an error.
    pub async fn check_exhausted_tokens(
        &self,
        pool: &CredentialPool,
        dir: Option<&Path>,
    ) -> Vec<String> {
        let default = PathBuf::from(DEFAULT_COOLDOWN_DIR);
        let dir = dir.unwrap_or(&default);

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut restored = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(_) => break,
            };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(COOLDOWN_FILE_EXTENSION) {
                continue;
            }

            let Ok(raw) = tokio::fs::read_to_string(&path).await else {
                warn!(event = "recovery.read_failed", path = %path.display());
                continue;
            };
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }

            if !self.controller.verify_specific_token(token).await {
                continue;
            }

            match self.controller.verify_token_quota(token).await {
                Ok(quota) => {
                    if let Err(err) = pool
                        .add(token, quota.chat_remaining, quota.chat_remaining)
                        .await
                    {
                        warn!(event = "recovery.reinstate_failed", %err);
                        continue;
                    }
                    debug!(event = "recovery.reinstated", token_prefix = &token[..token.len().min(8)]);
                    restored.push(token.to_string());
                }
                Err(err) => {
                    warn!(event = "recovery.quota_check_failed", %err);
                }
            }
        }

        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::OAuthController;
    use crate::error::OAuthError;
    use crate::sleeper::Sleeper;
    use crate::transport::OAuthTransport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct PerTokenTransport {
        quotas: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl OAuthTransport for PerTokenTransport {
        async fn post_form(&self, _url: &str, _form: &[(&str, &str)]) -> Result<Value, OAuthError> {
            unreachable!("recovery only issues GETs")
        }

        async fn get_json(&self, _url: &str, headers: &[(&str, &str)]) -> Result<Value, OAuthError> {
            let auth = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("Authorization"))
                .map(|(_, v)| v.trim_start_matches("token ").to_string())
                .unwrap_or_default();
            let chat = *self.quotas.lock().unwrap().get(&auth).unwrap_or(&0);
            Ok(json!({"token": auth, "limited_user_quotas": {"chat": chat}}))
        }
    }

    struct NoopSleeper;
    #[async_trait]
    impl Sleeper for NoopSleeper {
        async fn sleep_secs(&self, _secs: u64) {}
    }

    #[tokio::test]
    async fn s9_recovery_scan_reinstates_only_nonzero_quota() {
        let dir = tempdir();
        let t1: String = std::iter::repeat('1').take(24).collect();
        let t2: String = std::iter::repeat('2').take(24).collect();
        std::fs::write(dir.join(format!("{t1}.copilot_token")), &t1).unwrap();
        std::fs::write(dir.join(format!("{t2}.copilot_token")), &t2).unwrap();

        let mut quotas = HashMap::new();
        quotas.insert(t1.clone(), 0);
        quotas.insert(t2.clone(), 30);
        let transport = PerTokenTransport {
            quotas: Mutex::new(quotas),
        };
        let sleeper = NoopSleeper;
        let controller = OAuthController::new(&transport, &sleeper);
        let scanner = RecoveryScanner::new(&controller);

        let pool = CredentialPool::new();
        let restored = scanner.check_exhausted_tokens(&pool, Some(&dir)).await;

        assert_eq!(restored, vec![t2.clone()]);
        assert_eq!(pool.total_count().await, 1);
        let snapshot = pool.snapshot().await;
        assert_eq!(snapshot[0].token, t2);
        assert_eq!(snapshot[0].quota_remaining, 30);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_directory_yields_empty_result() {
        let transport = PerTokenTransport {
            quotas: Mutex::new(HashMap::new()),
        };
        let sleeper = NoopSleeper;
        let controller = OAuthController::new(&transport, &sleeper);
        let scanner = RecoveryScanner::new(&controller);
        let pool = CredentialPool::new();
        let restored = scanner
            .check_exhausted_tokens(&pool, Some(Path::new("/nonexistent/cooldown/dir")))
            .await;
        assert!(restored.is_empty());
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "coproxy-recovery-test-{}",
            std::process::id().wrapping_add(line!())
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
