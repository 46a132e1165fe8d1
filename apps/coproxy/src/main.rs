mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coproxy_backup::{BackupEngine, BackupState};
use coproxy_config::{
    COOLDOWN_FILE_EXTENSION, DEFAULT_COOLDOWN_DIR, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_RECOVERY_INTERVAL, REQUEST_TIMEOUT,
};
use coproxy_oauth::{OAuthController, RecoveryScanner, TokioSleeper, WreqOAuthTransport};
use coproxy_pool::CredentialPool;
use coproxy_stats::ProxyStats;

use cli::{BackupAction, Cli, Command};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { host, port, recovery_interval_secs, cooldown_dir } => {
            serve(host, port, recovery_interval_secs, cooldown_dir).await
        }
        Command::AddAccount { cooldown_dir } => add_account(cooldown_dir).await,
        Command::Recover { cooldown_dir } => recover(cooldown_dir).await,
        Command::Stats { host, port } => stats(host, port).await,
        Command::Backup { action } => backup(action).await,
    }
}

async fn serve(
    host: Option<String>,
    port: Option<u16>,
    recovery_interval_secs: Option<u64>,
    cooldown_dir: Option<String>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = port.unwrap_or(DEFAULT_PORT);
    let recovery_interval = recovery_interval_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RECOVERY_INTERVAL);
    let cooldown_dir = cooldown_dir.map(PathBuf::from);

    let pool = Arc::new(CredentialPool::new());
    let stats = Arc::new(ProxyStats::new());

    tokio::spawn(recovery_loop(pool.clone(), recovery_interval, cooldown_dir));

    coproxy_server::run_foreground(pool, stats, &host, port).await?;
    Ok(())
}

async fn recovery_loop(pool: Arc<CredentialPool>, interval: Duration, cooldown_dir: Option<PathBuf>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let transport = match WreqOAuthTransport::new(REQUEST_TIMEOUT) {
            Ok(transport) => transport,
            Err(err) => {
                warn!(event = "recovery.transport_init_failed", error = %err);
                continue;
            }
        };
        let sleeper = TokioSleeper;
        let controller = OAuthController::new(&transport, &sleeper);
        let scanner = RecoveryScanner::new(&controller);
        let restored = scanner.check_exhausted_tokens(&pool, cooldown_dir.as_deref()).await;
        if !restored.is_empty() {
            info!(event = "recovery.scan_complete", restored = restored.len());
        }
    }
}

async fn add_account(cooldown_dir: Option<String>) -> anyhow::Result<()> {
    let pool = CredentialPool::new();
    let transport = WreqOAuthTransport::new(REQUEST_TIMEOUT)?;
    let sleeper = TokioSleeper;
    let controller = OAuthController::new(&transport, &sleeper);

    let device = controller.request_device_code().await?;
    println!("Go to {} and enter code {}", device.verification_uri, device.user_code);

    let result = controller.add_account(&pool).await?;
    if result.duplicate {
        println!("This account is already the active credential; not added again.");
    } else {
        println!(
            "Added account with chat quota {} (token ends in ...{})",
            result.quota.chat_remaining,
            &result.access_token[result.access_token.len().saturating_sub(4)..]
        );
        let dir = cooldown_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_COOLDOWN_DIR));
        park_in_cooldown_store(&dir, &result.access_token).await?;
        println!("Token written to {}; a running `serve` picks it up on its next recovery scan.", dir.display());
    }
    Ok(())
}

/// Drops a newly-obtained token into the cooldown store in the same
/// `<token>.copilot_token` format [`coproxy_oauth::RecoveryScanner`] reads,
/// so a separately-running `serve` process admits it on its next scan
/// instead of the token only ever existing in this one-shot process.
async fn park_in_cooldown_store(dir: &std::path::Path, token: &str) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{token}.{COOLDOWN_FILE_EXTENSION}"));
    tokio::fs::write(path, token).await?;
    Ok(())
}

async fn recover(cooldown_dir: Option<String>) -> anyhow::Result<()> {
    let pool = CredentialPool::new();
    let transport = WreqOAuthTransport::new(REQUEST_TIMEOUT)?;
    let sleeper = TokioSleeper;
    let controller = OAuthController::new(&transport, &sleeper);
    let scanner = RecoveryScanner::new(&controller);

    let dir = cooldown_dir.map(PathBuf::from);
    let restored = scanner.check_exhausted_tokens(&pool, dir.as_deref()).await;
    println!("Reinstated {} credential(s):", restored.len());
    for token in &restored {
        println!("  ...{}", &token[token.len().saturating_sub(4)..]);
    }
    Ok(())
}

async fn stats(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| "127.0.0.1".to_string());
    let port = port.unwrap_or(DEFAULT_PORT);
    let url = format!("http://{host}:{port}/stats");

    let client = wreq::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let body: serde_json::Value = client.get(&url).send().await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn backup(action: BackupAction) -> anyhow::Result<()> {
    let pool = CredentialPool::new();
    let state = BackupState::new();

    match action {
        BackupAction::Export { path, password } => {
            BackupEngine::export(&pool, &state, &PathBuf::from(&path), password.as_deref()).await?;
            println!("Exported pool to {path}");
        }
        BackupAction::Import { path, password } => {
            let count = BackupEngine::import(&pool, &state, &PathBuf::from(&path), password.as_deref()).await?;
            println!("Imported {count} credential(s) from {path}");
        }
    }
    Ok(())
}
