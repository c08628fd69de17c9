//! Health check handler.

use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::server::state::SharedState;

/// GET /api/health
pub async fn health_handler(State(state): State<SharedState>) -> Response {
    let st = state.lock().await;
    let users = st.storage.count_users().unwrap_or(0);
    let pending_requests = st.storage.count_pending_requests().unwrap_or(0);
    axum::Json(serde_json::json!({
        "status": "ok",
        "users": users,
        "pending_requests": pending_requests,
        "chat_enabled": st.chat.is_some(),
    }))
    .into_response()
}
