//! Chat provider token handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::server::session::CurrentUser;
use crate::server::state::SharedState;
use crate::server::utils::api_error;

/// GET /api/chat/token
///
/// Mints the token the browser chat SDK connects with. The API key rides
/// along so the client needs no separate configuration.
pub async fn chat_token_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let chat = {
        let st = state.lock().await;
        st.chat.clone()
    };

    let Some(chat) = chat else {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "chat provider is not configured",
        );
    };

    match chat.user_token(&me.id) {
        Ok(token) => axum::Json(serde_json::json!({
            "token": token,
            "user_id": me.id,
            "api_key": chat.api_key(),
        }))
        .into_response(),
        Err(e) => {
            crate::tlog!("chat: token mint failed for {}: {e}", crate::logging::user_id(&me.id));
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}
