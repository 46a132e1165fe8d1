#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("client ID is not configured")]
    MisconfiguredClient,
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
    #[error("device code expired before authorization completed")]
    DeviceCodeExpired,
    #[error("user denied the authorization request")]
    AccessDenied,
    #[error("device code was rejected by the authorization server")]
    InvalidDeviceCode,
    #[error("authorization failed with upstream error code: {0}")]
    AuthorizationError(String),
    #[error("authorization timed out after exhausting the poll attempt budget")]
    AuthorizationTimeout,
}
