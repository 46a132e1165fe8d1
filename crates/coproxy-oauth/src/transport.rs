//! HTTP transport abstraction for the Device Flow and quota-verification
//! calls. Kept as a trait so the state machine in [`crate::device_flow`] and
//! [`crate::controller`] can be exercised against canned responses in tests
//! without reaching the network, mirroring how this codebase's upstream
//! client is kept behind a trait rather than a concrete `wreq::Client`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OAuthError;

#[async_trait]
pub trait OAuthTransport: Send + Sync {
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, OAuthError>;

    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, OAuthError>;
}

/// Production transport backed by `wreq`.
pub struct WreqOAuthTransport {
    client: wreq::Client,
}

impl WreqOAuthTransport {
    pub fn new(timeout: Duration) -> Result<Self, OAuthError> {
        let client = wreq::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| OAuthError::TransportError(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OAuthTransport for WreqOAuthTransport {
    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Value, OAuthError> {
        let resp = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|err| OAuthError::TransportError(err.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(OAuthError::MalformedResponse(format!(
                "upstream returned status {status}"
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|err| OAuthError::MalformedResponse(err.to_string()))
    }

    async fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, OAuthError> {
        let mut builder = self.client.get(url);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let resp = builder
            .send()
            .await
            .map_err(|err| OAuthError::TransportError(err.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(OAuthError::MalformedResponse(format!(
                "upstream returned status {status}"
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|err| OAuthError::MalformedResponse(err.to_string()))
    }
}
