//! Shared helpers for handlers: error responses and JSON projections.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::storage::{FriendRequestRow, StorageError, UserRow};

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map an unexpected storage failure to a 500. The detail goes to the log,
/// not to the client; callers that expect NotFound/AlreadyExists handle
/// those variants before reaching for this.
pub fn storage_error(e: StorageError) -> Response {
    crate::tlog!("storage error: {e}");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The subset of a user other people see: enough to render a profile card,
/// nothing account-private.
pub fn user_card_json(u: &UserRow) -> serde_json::Value {
    serde_json::json!({
        "id": u.id,
        "full_name": u.full_name,
        "profile_pic": u.profile_pic,
        "native_language": u.native_language,
        "learning_language": u.learning_language,
    })
}

/// The full view a user gets of their own account. Never includes the
/// password hash.
pub fn user_account_json(u: &UserRow) -> serde_json::Value {
    serde_json::json!({
        "id": u.id,
        "email": u.email,
        "full_name": u.full_name,
        "bio": u.bio,
        "profile_pic": u.profile_pic,
        "native_language": u.native_language,
        "learning_language": u.learning_language,
        "location": u.location,
        "is_onboarded": u.is_onboarded,
        "created_at": u.created_at,
        "updated_at": u.updated_at,
    })
}

/// A friend request row plus an embedded card for one side of it. The key
/// is always the role name ("sender" or "receiver"), never a bare user
/// object, so clients know which side they are looking at.
pub fn request_json_with(
    r: &FriendRequestRow,
    role: &str,
    user: &UserRow,
) -> serde_json::Value {
    let mut value = serde_json::json!({
        "id": r.id,
        "sender_id": r.sender_id,
        "receiver_id": r.receiver_id,
        "status": r.status,
        "seen": r.seen,
        "created_at": r.created_at,
        "updated_at": r.updated_at,
    });
    value[role] = user_card_json(user);
    value
}
