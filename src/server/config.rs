//! Configuration types and constants for the tandem server.

use std::path::PathBuf;

use clap::Parser;

pub(crate) const WS_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;

/// File under the data directory holding the generated session-signing
/// secret when none is configured. Deleting it logs every session out.
pub(crate) const SESSION_SECRET_FILE: &str = "session.key";

/// Language-exchange social server.
///
/// Accounts, friend requests, notification state, and chat-provider token
/// minting over REST + WebSocket, persisted in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "tandem-server", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: TANDEM_BIND] [default: 127.0.0.1:5001]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database and generated secrets
    /// [env: TANDEM_HOME] [default: ~/.tandem]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Secret for signing session tokens [env: TANDEM_JWT_SECRET]
    /// [default: generated and persisted under the data directory]
    #[arg(long)]
    pub jwt_secret: Option<String>,

    /// Stream Chat API key [env: TANDEM_STREAM_KEY]
    #[arg(long)]
    pub stream_key: Option<String>,

    /// Stream Chat API secret [env: TANDEM_STREAM_SECRET]
    #[arg(long)]
    pub stream_secret: Option<String>,

    /// Stream Chat API base URL [env: TANDEM_STREAM_URL]
    #[arg(long)]
    pub stream_url: Option<String>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub jwt_secret: Option<String>,
    pub stream_key: Option<String>,
    pub stream_secret: Option<String>,
    pub stream_url: Option<String>,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("TANDEM_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".tandem"))
                    .unwrap_or_else(|_| PathBuf::from(".tandem"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("TANDEM_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:5001".to_string());

        let jwt_secret = cli
            .jwt_secret
            .or_else(|| std::env::var("TANDEM_JWT_SECRET").ok());

        let stream_key = cli
            .stream_key
            .or_else(|| std::env::var("TANDEM_STREAM_KEY").ok());

        let stream_secret = cli
            .stream_secret
            .or_else(|| std::env::var("TANDEM_STREAM_SECRET").ok());

        let stream_url = cli
            .stream_url
            .or_else(|| std::env::var("TANDEM_STREAM_URL").ok());

        Self {
            bind_addr,
            data_dir,
            jwt_secret,
            stream_key,
            stream_secret,
            stream_url,
        }
    }
}
