//! Orchestrates the Device Flow end to end and validates upstream quota for
//! both newly-authenticated and recovered credentials.

use serde_json::Value;
use tracing::info;

use coproxy_config::{DEFAULT_MAX_POLL_ATTEMPTS, TOKEN_METADATA_URL, UPSTREAM_HEADERS};
use coproxy_pool::CredentialPool;

use crate::device_flow::{poll_for_authorization, request_device_code, DeviceAuthorization};
use crate::error::OAuthError;
use crate::sleeper::Sleeper;
use crate::transport::OAuthTransport;

#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaInfo {
    pub chat_remaining: i64,
}

#[derive(Debug, Clone)]
pub struct AddAccountResult {
    pub access_token: String,
    pub quota: QuotaInfo,
    pub duplicate: bool,
    pub success: bool,
}

pub struct OAuthController<'a> {
    transport: &'a dyn OAuthTransport,
    sleeper: &'a dyn Sleeper,
}

impl<'a> OAuthController<'a> {
    pub fn new(transport: &'a dyn OAuthTransport, sleeper: &'a dyn Sleeper) -> Self {
        Self { transport, sleeper }
    }

    pub async fn request_device_code(&self) -> Result<DeviceAuthorization, OAuthError> {
        request_device_code(self.transport).await
    }

    pub async fn poll_for_authorization(
        &self,
        device_code: &str,
        interval: u64,
    ) -> Result<String, OAuthError> {
        poll_for_authorization(
            self.transport,
            self.sleeper,
            device_code,
            interval,
            DEFAULT_MAX_POLL_ATTEMPTS,
        )
        .await
    }

    /// GET the token-metadata endpoint and extract the chat quota.
    pub async fn verify_token_quota(&self, token: &str) -> Result<QuotaInfo, OAuthError> {
        let headers = auth_headers(token);
        let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let body = self.transport.get_json(TOKEN_METADATA_URL, &header_refs).await?;

        if body.get("token").and_then(Value::as_str).is_none() {
            return Err(OAuthError::MalformedResponse(
                "missing field: token".to_string(),
            ));
        }

        let chat_remaining = body
            .get("limited_user_quotas")
            .and_then(|q| q.get("chat"))
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Ok(QuotaInfo { chat_remaining })
    }

    /// Never raises: transport/format errors are treated as "not usable".
    pub async fn verify_specific_token(&self, token: &str) -> bool {
        match self.verify_token_quota(token).await {
            Ok(quota) => quota.chat_remaining > 0,
            Err(_) => false,
        }
    }

    /// Authenticate via Device Flow, verify quota, and register the
    /// resulting credential with the pool (unless it duplicates the pool's
    /// current selection).
    pub async fn add_account(&self, pool: &CredentialPool) -> Result<AddAccountResult, OAuthError> {
        let device = self.request_device_code().await?;
        let access_token = self
            .poll_for_authorization(&device.device_code, device.interval)
            .await?;
        let quota = self.verify_token_quota(&access_token).await?;

        let duplicate = pool.get_current().await.as_deref() == Some(access_token.as_str());
        if duplicate {
            info!(event = "oauth.add_account_duplicate");
            return Ok(AddAccountResult {
                access_token,
                quota,
                duplicate: true,
                success: false,
            });
        }

        pool.add(&access_token, quota.chat_remaining, quota.chat_remaining)
            .await
            .map_err(|err| OAuthError::MalformedResponse(err.to_string()))?;
        info!(event = "oauth.add_account_success", chat_remaining = quota.chat_remaining);

        Ok(AddAccountResult {
            access_token,
            quota,
            duplicate: false,
            success: true,
        })
    }
}

fn auth_headers(token: &str) -> Vec<(String, String)> {
    let mut headers = vec![("Authorization".to_string(), format!("token {token}"))];
    headers.extend(
        UPSTREAM_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    headers
}
