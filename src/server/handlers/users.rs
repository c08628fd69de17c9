//! User listing handlers: recommendations and the friends list.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::server::session::CurrentUser;
use crate::server::state::SharedState;
use crate::server::utils::{storage_error, user_card_json};

/// GET /api/users
///
/// Onboarded accounts the caller might want to meet: everyone except the
/// caller and their existing friends.
pub async fn recommended_users_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_recommended(&me.id) {
        Ok(users) => {
            let cards: Vec<serde_json::Value> = users.iter().map(user_card_json).collect();
            axum::Json(serde_json::json!({ "recommended_users": cards })).into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// GET /api/users/friends
pub async fn friends_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let st = state.lock().await;
    match st.storage.list_friends(&me.id) {
        Ok(friends) => {
            let cards: Vec<serde_json::Value> = friends.iter().map(user_card_json).collect();
            axum::Json(serde_json::json!(cards)).into_response()
        }
        Err(e) => storage_error(e),
    }
}
