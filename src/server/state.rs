//! Shared application state and WebSocket event types.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use crate::storage::Storage;
use crate::stream_chat::StreamChat;

/// Events broadcast to connected WebSocket clients.
///
/// Every event names its audience user; the socket task drops events
/// addressed to anyone other than the session it serves.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    /// A new friend request landed in the receiver's inbox.
    FriendRequestReceived {
        request_id: i64,
        sender_id: String,
        receiver_id: String,
        sender_name: String,
    },
    /// The receiver accepted; the original sender gets the news.
    FriendRequestAccepted {
        request_id: i64,
        sender_id: String,
        receiver_id: String,
        receiver_name: String,
    },
    /// The receiver's notification panel marked everything seen; lets other
    /// open tabs clear their badge without re-polling.
    RequestsSeen {
        receiver_id: String,
        request_ids: Vec<i64>,
    },
}

impl WsEvent {
    /// The user this event is addressed to.
    pub fn audience(&self) -> &str {
        match self {
            WsEvent::FriendRequestReceived { receiver_id, .. } => receiver_id,
            WsEvent::FriendRequestAccepted { sender_id, .. } => sender_id,
            WsEvent::RequestsSeen { receiver_id, .. } => receiver_id,
        }
    }
}

pub struct AppState {
    pub storage: Storage,
    /// Secret for signing and verifying session tokens.
    pub jwt_secret: String,
    /// Chat provider integration; `None` runs the server with chat disabled.
    pub chat: Option<StreamChat>,
    pub ws_tx: broadcast::Sender<WsEvent>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

pub type SharedState = Arc<Mutex<AppState>>;
