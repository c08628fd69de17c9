//! Friend request handlers: sending, accepting, and the request listings.
//!
//! The storage layer enforces the hard invariants (one request per user
//! pair, guarded pending->resolved transition); handlers translate those
//! outcomes into status codes and emit the WebSocket events.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;

use crate::server::session::CurrentUser;
use crate::server::state::{SharedState, WsEvent};
use crate::server::utils::{
    api_error, now_secs, request_json_with, storage_error, user_card_json,
};
use crate::storage::{FriendRequestRow, StorageError};

/// POST /api/users/friend-request/:id
pub async fn send_request_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(receiver_id): Path<String>,
) -> Response {
    if receiver_id == me.id {
        return api_error(
            StatusCode::BAD_REQUEST,
            "you cannot send a friend request to yourself",
        );
    }

    let (request, receiver) = {
        let st = state.lock().await;

        let receiver = match st.storage.get_user(&receiver_id) {
            Ok(Some(receiver)) => receiver,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        };

        match st.storage.are_friends(&me.id, &receiver_id) {
            Ok(true) => {
                return api_error(
                    StatusCode::CONFLICT,
                    "you are already friends with this user",
                );
            }
            Ok(false) => {}
            Err(e) => return storage_error(e),
        }

        // Either direction counts: if they already asked us, the answer is
        // to accept that request, not to race a mirrored one.
        match st.storage.find_request_between(&me.id, &receiver_id) {
            Ok(Some(_)) => {
                return api_error(
                    StatusCode::CONFLICT,
                    "a friend request already exists between you and this user",
                );
            }
            Ok(None) => {}
            Err(e) => return storage_error(e),
        }

        let now = now_secs();
        let mut request = FriendRequestRow {
            id: 0,
            sender_id: me.id.clone(),
            receiver_id: receiver_id.clone(),
            status: "pending".to_string(),
            seen: false,
            created_at: now,
            updated_at: now,
        };
        request.id = match st.storage.insert_friend_request(&request) {
            Ok(id) => id,
            // Unique pair index closes the check-then-insert window; a loser
            // of that race gets the same conflict answer as the check above.
            Err(StorageError::AlreadyExists(_)) => {
                return api_error(
                    StatusCode::CONFLICT,
                    "a friend request already exists between you and this user",
                );
            }
            Err(e) => return storage_error(e),
        };

        let _ = st.ws_tx.send(WsEvent::FriendRequestReceived {
            request_id: request.id,
            sender_id: me.id.clone(),
            receiver_id: receiver_id.clone(),
            sender_name: me.full_name.clone(),
        });

        (request, receiver)
    };

    crate::tlog!(
        "friends: {} -> {} request {} sent",
        crate::logging::user_id(&me.id),
        crate::logging::user_id(&receiver_id),
        crate::logging::request_id(request.id),
    );

    let mut request_body = request_json_with(&request, "sender", &me);
    request_body["receiver"] = user_card_json(&receiver);
    let body = serde_json::json!({
        "message": "friend request sent",
        "friend_request": request_body,
    });
    (StatusCode::CREATED, axum::Json(body)).into_response()
}

/// PUT /api/users/friend-request/:id/accept
pub async fn accept_request_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Response {
    let (request, sender) = {
        let st = state.lock().await;

        let mut request = match st.storage.get_friend_request(id) {
            Ok(Some(request)) => request,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "friend request not found"),
            Err(e) => return storage_error(e),
        };

        // Only the addressee may accept.
        if request.receiver_id != me.id {
            return api_error(
                StatusCode::FORBIDDEN,
                "you are not authorized to accept this friend request",
            );
        }

        if request.status != "pending" {
            return api_error(
                StatusCode::CONFLICT,
                format!("friend request is already {}", request.status),
            );
        }

        let now = now_secs();
        match st.storage.resolve_friend_request(id, "accepted", now) {
            Ok(true) => {}
            // Someone beat us between the read above and this update.
            Ok(false) => {
                return api_error(StatusCode::CONFLICT, "friend request is already resolved");
            }
            Err(e) => return storage_error(e),
        }
        request.status = "accepted".to_string();
        request.updated_at = now;

        if let Err(e) = st.storage.link_friends(&request.sender_id, &request.receiver_id, now) {
            return storage_error(e);
        }

        let sender = match st.storage.get_user(&request.sender_id) {
            Ok(Some(sender)) => sender,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "sender not found"),
            Err(e) => return storage_error(e),
        };

        let _ = st.ws_tx.send(WsEvent::FriendRequestAccepted {
            request_id: request.id,
            sender_id: request.sender_id.clone(),
            receiver_id: me.id.clone(),
            receiver_name: me.full_name.clone(),
        });

        (request, sender)
    };

    crate::tlog!(
        "friends: request {} accepted, {} and {} are now friends",
        crate::logging::request_id(request.id),
        crate::logging::user_id(&request.sender_id),
        crate::logging::user_id(&me.id),
    );

    let mut request_body = request_json_with(&request, "sender", &sender);
    request_body["receiver"] = user_card_json(&me);
    let body = serde_json::json!({
        "message": "friend request accepted",
        "friend_request": request_body,
    });
    axum::Json(body).into_response()
}

/// GET /api/users/friend-requests
///
/// Two panels in one response: requests waiting on the caller, and requests
/// the caller has already accepted (the "you are now friends" history).
/// Every entry embeds the sender's card under the `sender` key.
pub async fn list_requests_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let st = state.lock().await;

    let incoming = match st.storage.list_requests_for_receiver(&me.id, "pending") {
        Ok(rows) => rows,
        Err(e) => return storage_error(e),
    };
    let accepted = match st.storage.list_requests_for_receiver(&me.id, "accepted") {
        Ok(rows) => rows,
        Err(e) => return storage_error(e),
    };

    let mut incoming_json = Vec::with_capacity(incoming.len());
    for request in &incoming {
        match st.storage.get_user(&request.sender_id) {
            Ok(Some(sender)) => {
                incoming_json.push(request_json_with(request, "sender", &sender));
            }
            Ok(None) => {}
            Err(e) => return storage_error(e),
        }
    }

    let mut accepted_json = Vec::with_capacity(accepted.len());
    for request in &accepted {
        match st.storage.get_user(&request.sender_id) {
            Ok(Some(sender)) => {
                accepted_json.push(request_json_with(request, "sender", &sender));
            }
            Ok(None) => {}
            Err(e) => return storage_error(e),
        }
    }

    let body = serde_json::json!({
        "incoming_requests": incoming_json,
        "accepted_requests": accepted_json,
    });
    axum::Json(body).into_response()
}

/// GET /api/users/outgoing-friends-requests
///
/// Pending requests the caller has sent, each embedding the receiver's card
/// so the client can mark those users as "request sent".
pub async fn outgoing_requests_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
) -> Response {
    let st = state.lock().await;

    let outgoing = match st.storage.list_requests_from_sender(&me.id, "pending") {
        Ok(rows) => rows,
        Err(e) => return storage_error(e),
    };

    let mut outgoing_json = Vec::with_capacity(outgoing.len());
    for request in &outgoing {
        match st.storage.get_user(&request.receiver_id) {
            Ok(Some(receiver)) => {
                outgoing_json.push(request_json_with(request, "receiver", &receiver));
            }
            Ok(None) => {}
            Err(e) => return storage_error(e),
        }
    }

    axum::Json(serde_json::json!(outgoing_json)).into_response()
}
