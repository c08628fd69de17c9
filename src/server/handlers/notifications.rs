//! Notification handlers: the unseen-requests feed and mark-all-seen.
//!
//! Clients poll PUT mark-seen and diff the returned IDs against their own
//! snapshot, so both endpoints return a bare array with the sender card
//! embedded and `seen` reflecting the state the poll observed.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::server::session::CurrentUser;
use crate::server::state::{SharedState, WsEvent};
use crate::server::utils::{request_json_with, storage_error};
use crate::storage::FriendRequestRow;

/// GET /api/users/unseen-friend-requests
///
/// Requests addressed to the caller that no notification panel has
/// displayed yet, any status. Read-only peek; nothing is flipped.
pub async fn unseen_requests_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let st = state.lock().await;

    let unseen = match st.storage.list_unseen_for_receiver(&me.id) {
        Ok(rows) => rows,
        Err(e) => return storage_error(e),
    };

    match populate_senders(&st, &unseen) {
        Ok(json) => axum::Json(serde_json::json!(json)).into_response(),
        Err(resp) => resp,
    }
}

/// PUT /api/users/friend-requests/mark-seen
///
/// Atomically flips every unseen request addressed to the caller and
/// returns exactly the set that was flipped, still presented as unseen.
/// Idempotent: a second call returns an empty array.
pub async fn mark_seen_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let st = state.lock().await;

    let flipped = match st.storage.mark_all_requests_seen(&me.id) {
        Ok(rows) => rows,
        Err(e) => return storage_error(e),
    };

    if !flipped.is_empty() {
        crate::tlog!(
            "notifications: {} marked {} request(s) seen",
            crate::logging::user_id(&me.id),
            flipped.len()
        );
        let _ = st.ws_tx.send(WsEvent::RequestsSeen {
            receiver_id: me.id.clone(),
            request_ids: flipped.iter().map(|r| r.id).collect(),
        });
    }

    match populate_senders(&st, &flipped) {
        Ok(json) => axum::Json(serde_json::json!(json)).into_response(),
        Err(resp) => resp,
    }
}

/// Attach each request's sender card. Rows whose sender row has vanished
/// are dropped rather than failing the whole feed.
fn populate_senders(
    st: &crate::server::state::AppState,
    requests: &[FriendRequestRow],
) -> Result<Vec<serde_json::Value>, Response> {
    let mut json = Vec::with_capacity(requests.len());
    for request in requests {
        match st.storage.get_user(&request.sender_id) {
            Ok(Some(sender)) => json.push(request_json_with(request, "sender", &sender)),
            Ok(None) => {}
            Err(e) => return Err(storage_error(e)),
        }
    }
    Ok(json)
}
