//! tandem-server: HTTP + WebSocket server for the language-exchange app.
//!
//! Hosts the REST API (accounts, friend requests, notifications, chat
//! tokens) and the per-user WebSocket event stream, persisting everything
//! in SQLite.

pub mod config;
pub mod handlers;
pub mod router;
pub mod session;
pub mod state;
pub mod utils;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;

use crate::storage::Storage;
use crate::stream_chat::StreamChat;

use config::{Cli, Config, SESSION_SECRET_FILE, WS_CHANNEL_CAPACITY};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start the server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::tlog!("tandem-server starting");
    crate::tlog!("  data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).expect("failed to create data directory");

    let db_path = config.data_dir.join("tandem.db");
    let storage = Storage::open(&db_path).expect("failed to open database");
    crate::tlog!("  database: {}", db_path.display());

    let jwt_secret = match config.jwt_secret {
        Some(secret) => secret,
        None => load_or_create_secret(&config.data_dir),
    };

    let chat = StreamChat::from_config(config.stream_key, config.stream_secret, config.stream_url);
    match &chat {
        Some(_) => crate::tlog!("  chat provider: configured"),
        None => crate::tlog!("  chat provider: disabled (no credentials configured)"),
    }

    let (ws_tx, _) = broadcast::channel(WS_CHANNEL_CAPACITY);

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        jwt_secret,
        chat,
        ws_tx,
        ws_connection_count: Arc::new(AtomicUsize::new(0)),
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::tlog!("tandem-server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}

/// Load the persisted session-signing secret, generating one on first boot.
/// An operator-provided secret (CLI/env) bypasses this entirely.
fn load_or_create_secret(data_dir: &std::path::Path) -> String {
    let path = data_dir.join(SESSION_SECRET_FILE);
    match std::fs::read_to_string(&path) {
        Ok(secret) if !secret.trim().is_empty() => secret.trim().to_string(),
        _ => {
            let secret = crate::auth::generate_secret();
            if let Err(e) = std::fs::write(&path, &secret) {
                crate::tlog!(
                    "WARNING: could not persist session secret to {}: {e}",
                    path.display()
                );
                crate::tlog!("         sessions will not survive a restart");
            } else {
                crate::tlog!("  session secret: generated at {}", path.display());
            }
            secret
        }
    }
}
