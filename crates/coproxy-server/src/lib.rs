//! OpenAI-compatible HTTP surface in front of the Copilot chat-completions
//! backend: request validation, credential selection, upstream forwarding,
//! response rewriting, and the two-process start/stop lifecycle.

mod app;
mod error;
mod handlers;
mod lifecycle;
mod upstream;

pub use app::build_router;
pub use error::ServerError;
pub use handlers::AppState;
pub use lifecycle::{ProxyServer, run_foreground};
pub use upstream::{UpstreamResponse, UpstreamTransport, WreqUpstreamTransport};
