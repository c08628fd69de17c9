//! WebSocket upgrade and per-user event delivery.
//!
//! One broadcast channel carries every event; each socket belongs to one
//! authenticated session and forwards only the events addressed to that
//! user. Polling remains the fallback contract, so dropping a socket (or an
//! event, under lag) never loses state.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tokio::sync::broadcast;

use crate::server::config::MAX_WS_CONNECTIONS;
use crate::server::session::CurrentUser;
use crate::server::state::SharedState;
use crate::server::utils::api_error;

/// GET /api/ws (behind the session middleware)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    // Check connection limit before upgrading
    let ws_count = {
        let st = state.lock().await;
        st.ws_connection_count.clone()
    };

    let current = ws_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many WebSocket connections (max {MAX_WS_CONNECTIONS})"),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, me.id))
        .into_response()
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, user_id: String) {
    let (mut rx, ws_count) = {
        let st = state.lock().await;
        let count = st.ws_connection_count.clone();
        count.fetch_add(1, Ordering::Relaxed);
        (st.ws_tx.subscribe(), count)
    };

    crate::tlog!("ws: {} connected", crate::logging::user_id(&user_id));

    loop {
        tokio::select! {
            // Forward this user's events to the socket
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if event.audience() != user_id {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::tlog!(
                            "ws: {} lagged, skipped {n} events",
                            crate::logging::user_id(&user_id)
                        );
                        // Tell the client to re-poll rather than trust its cache
                        let lag_msg = serde_json::json!({
                            "type": "events_missed",
                            "count": n,
                        });
                        if let Ok(json) = serde_json::to_string(&lag_msg) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Drain client frames; only close and ping matter
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    crate::tlog!("ws: {} disconnected", crate::logging::user_id(&user_id));
    ws_count.fetch_sub(1, Ordering::Relaxed);
}
