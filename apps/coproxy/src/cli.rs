use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "coproxy", version, about = "OpenAI-compatible reverse proxy in front of GitHub Copilot chat completions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the proxy server in the foreground.
    Serve {
        #[arg(long, env = "COPROXY_HOST")]
        host: Option<String>,
        #[arg(long, env = "COPROXY_PORT")]
        port: Option<u16>,
        #[arg(long, env = "COPROXY_RECOVERY_INTERVAL_SECS")]
        recovery_interval_secs: Option<u64>,
        #[arg(long, env = "COPROXY_COOLDOWN_DIR")]
        cooldown_dir: Option<String>,
    },
    /// Run the OAuth Device Flow interactively and report the result.
    AddAccount {
        #[arg(long, env = "COPROXY_COOLDOWN_DIR")]
        cooldown_dir: Option<String>,
    },
    /// Run one recovery scan pass over the cooldown store.
    Recover {
        #[arg(long, env = "COPROXY_COOLDOWN_DIR")]
        cooldown_dir: Option<String>,
    },
    /// Query a running instance's `/stats` endpoint.
    Stats {
        #[arg(long, env = "COPROXY_HOST")]
        host: Option<String>,
        #[arg(long, env = "COPROXY_PORT")]
        port: Option<u16>,
    },
    /// Export or import the credential pool as a ZIP archive.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum BackupAction {
    Export {
        path: String,
        #[arg(long)]
        password: Option<String>,
    },
    Import {
        path: String,
        #[arg(long)]
        password: Option<String>,
    },
}
