//! Forwarding to the GitHub Copilot chat-completions backend. Mirrors the
//! shape of `coproxy_oauth::transport::OAuthTransport`: a trait at the
//! network seam so the chat-completion handler can be exercised against a
//! scripted double.

use async_trait::async_trait;
use serde_json::Value;

use coproxy_config::{API_BASE, REQUEST_TIMEOUT, UPSTREAM_HEADERS};

use crate::error::ServerError;

/// Status code plus parsed JSON body from an upstream call.
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn post_chat_completions(
        &self,
        token: &str,
        body: Value,
    ) -> Result<UpstreamResponse, ServerError>;

    async fn list_models(&self, token: &str) -> Result<UpstreamResponse, ServerError>;
}

pub struct WreqUpstreamTransport {
    client: wreq::Client,
}

impl WreqUpstreamTransport {
    pub fn new() -> Result<Self, ServerError> {
        let client = wreq::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServerError::Upstream(e.to_string()))?;
        Ok(Self { client })
    }

    fn auth_header(token: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {token}"))
    }
}

#[async_trait]
impl UpstreamTransport for WreqUpstreamTransport {
    async fn post_chat_completions(
        &self,
        token: &str,
        body: Value,
    ) -> Result<UpstreamResponse, ServerError> {
        let (auth_name, auth_value) = Self::auth_header(token);
        let mut req = self
            .client
            .post(format!("{API_BASE}/chat/completions"))
            .header(auth_name, auth_value)
            .header("Content-Type", "application/json");
        for (name, value) in UPSTREAM_HEADERS {
            req = req.header(*name, *value);
        }
        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| ServerError::Upstream(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .json::<Value>()
            .await
            .map_err(|e| ServerError::Upstream(e.to_string()))?;
        Ok(UpstreamResponse { status, body })
    }

    async fn list_models(&self, token: &str) -> Result<UpstreamResponse, ServerError> {
        let (auth_name, auth_value) = Self::auth_header(token);
        let mut req = self.client.get(format!("{API_BASE}/models")).header(auth_name, auth_value);
        for (name, value) in UPSTREAM_HEADERS {
            req = req.header(*name, *value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ServerError::Upstream(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .json::<Value>()
            .await
            .map_err(|e| ServerError::Upstream(e.to_string()))?;
        Ok(UpstreamResponse { status, body })
    }
}
