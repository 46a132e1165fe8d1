use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use bytes::Bytes;
use serde_json::{Value, json};
use tracing::{debug, warn};

use coproxy_config::PRESERVED_MODEL_SUBSTRINGS;
use coproxy_pool::CredentialPool;
use coproxy_stats::ProxyStats;

use crate::error::ServerError;
use crate::upstream::UpstreamTransport;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<CredentialPool>,
    pub stats: Arc<ProxyStats>,
    pub upstream: Arc<dyn UpstreamTransport>,
}

fn validate_chat_request(body: &Value) -> Result<(), ServerError> {
    if body.get("model").is_none() {
        return Err(ServerError::InvalidRequest(
            "Request is missing required field: model".to_string(),
        ));
    }
    match body.get("messages") {
        Some(Value::Array(messages)) if !messages.is_empty() => Ok(()),
        Some(Value::Array(_)) => Err(ServerError::InvalidRequest(
            "Request field 'messages' must not be empty".to_string(),
        )),
        _ => Err(ServerError::InvalidRequest(
            "Request is missing required field: messages".to_string(),
        )),
    }
}

fn wants_streaming(body: &Value) -> bool {
    matches!(body.get("stream"), Some(Value::Bool(true)))
}

/// If the client asked for a model whose name we must preserve verbatim in
/// the response (the upstream backend normalizes these to its own internal
/// name), restore the originally requested string.
fn rewrite_model_name(requested_model: &str, response: &mut Value) {
    let lower = requested_model.to_ascii_lowercase();
    let preserve = PRESERVED_MODEL_SUBSTRINGS
        .iter()
        .any(|needle| lower.contains(needle));
    if preserve {
        if let Some(model_field) = response.get_mut("model") {
            *model_field = Value::String(requested_model.to_string());
            debug!(event = "chat.model_rewritten", model = requested_model);
        }
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    raw_body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
    let body: Value = serde_json::from_slice(&raw_body).map_err(|_| ServerError::MalformedJson)?;
    validate_chat_request(&body)?;

    if wants_streaming(&body) {
        return Ok(Json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Streaming is not supported by this proxy. Please retry the request with \"stream\": false.",
                }
            }]
        })));
    }

    let Some(token) = state.pool.get_current().await else {
        return Err(ServerError::NoCredentials);
    };
    debug!(event = "chat.credential_selected");

    let requested_model = body.get("model").and_then(Value::as_str).map(str::to_string);

    match state.upstream.post_chat_completions(&token, body).await {
        Ok(mut upstream) => {
            if let Some(requested_model) = requested_model {
                rewrite_model_name(&requested_model, &mut upstream.body);
            }
            state.stats.record_request(false).await;
            Ok(Json(upstream.body))
        }
        Err(err) => {
            warn!(event = "chat.upstream_error", error = %err);
            state.stats.record_request(true).await;
            Err(ServerError::Upstream(err.to_string()))
        }
    }
}

pub async fn list_models(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let Some(token) = state.pool.get_current().await else {
        return Err(ServerError::NoCredentials);
    };
    let upstream = state.upstream.list_models(&token).await?;
    let status = axum::http::StatusCode::from_u16(upstream.status)
        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(upstream.body)))
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.stats.snapshot().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_model() {
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        assert!(validate_chat_request(&body).is_err());
    }

    #[test]
    fn rejects_empty_messages() {
        let body = json!({"model": "gpt-4o", "messages": []});
        assert!(validate_chat_request(&body).is_err());
    }

    #[test]
    fn rejects_missing_messages() {
        let body = json!({"model": "gpt-4o"});
        assert!(validate_chat_request(&body).is_err());
    }

    #[test]
    fn accepts_well_formed_request() {
        let body = json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]});
        assert!(validate_chat_request(&body).is_ok());
    }

    #[test]
    fn streaming_flag_is_detected_only_when_true() {
        assert!(wants_streaming(&json!({"stream": true})));
        assert!(!wants_streaming(&json!({"stream": false})));
        assert!(!wants_streaming(&json!({})));
    }

    #[test]
    fn rewrite_preserves_requested_name_for_claude_sonnet() {
        let mut response = json!({"model": "copilot-upstream-internal"});
        rewrite_model_name("claude-3.5-sonnet", &mut response);
        assert_eq!(response["model"], "claude-3.5-sonnet");
    }

    #[test]
    fn rewrite_is_case_insensitive_and_substring_matched() {
        let mut response = json!({"model": "internal"});
        rewrite_model_name("GPT-4O-2024", &mut response);
        assert_eq!(response["model"], "GPT-4O-2024");
    }

    #[test]
    fn rewrite_leaves_unrelated_models_untouched() {
        let mut response = json!({"model": "copilot-upstream-internal"});
        rewrite_model_name("gpt-3.5-turbo", &mut response);
        assert_eq!(response["model"], "copilot-upstream-internal");
    }
}
