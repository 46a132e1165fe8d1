//! Compile-time constants shared by every other `coproxy` crate: the upstream
//! base URL, the OAuth Device Flow endpoints, the client ID, and the headers
//! GitHub Copilot expects on every upstream call. Nothing here depends on I/O
//! or on any other crate in the workspace.

use std::time::Duration;

/// OAuth client ID registered for the Copilot Chat VS Code extension.
pub const CLIENT_ID: &str = "01ab8ac9400c4e429b23";

/// Scope requested during the Device Authorization Grant.
pub const OAUTH_SCOPE: &str = "user:email";

pub const DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const TOKEN_METADATA_URL: &str = "https://api.github.com/copilot_internal/v2/token";

/// Base URL for the chat-completions and model-listing upstream.
pub const API_BASE: &str = "https://api.githubcopilot.com";

/// Default listen address for `coproxy serve`.
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// Default directory for the cooldown store of parked, exhausted credentials.
pub const DEFAULT_COOLDOWN_DIR: &str = "TokensAgotados";
pub const COOLDOWN_FILE_EXTENSION: &str = "copilot_token";

/// Default interval between background recovery scans.
pub const DEFAULT_RECOVERY_INTERVAL: Duration = Duration::from_secs(300);

/// Every outbound HTTP call (OAuth, recovery, chat forward, model listing)
/// carries this timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default attempt budget for `poll_for_authorization`.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 100;

/// Model names that must keep their originally-requested form in the
/// response, rather than the vendor's internal model identifier.
pub const PRESERVED_MODEL_SUBSTRINGS: &[&str] = &["claude-3.5-sonnet", "gpt-4o"];

/// Backup archive format version written into `metadata.json`.
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Headers required on every request sent to the upstream vendor API.
/// These values are load-bearing for acceptance by the vendor and must be
/// reproduced exactly.
pub const UPSTREAM_HEADERS: &[(&str, &str)] = &[
    ("copilot-integration-id", "vscode-chat"),
    ("editor-plugin-version", "copilot-chat/0.23.2"),
    ("editor-version", "vscode/1.96.3"),
    ("user-agent", "GitHubCopilotChat/0.23.2"),
    ("x-github-api-version", "2024-12-15"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_headers_are_exact() {
        let names: Vec<&str> = UPSTREAM_HEADERS.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            names,
            vec![
                "copilot-integration-id",
                "editor-plugin-version",
                "editor-version",
                "user-agent",
                "x-github-api-version",
            ]
        );
    }
}
