//! Account handlers: signup, login, logout, current account, onboarding.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::server::session::{expired_session_cookie, session_cookie, CurrentUser};
use crate::server::state::SharedState;
use crate::server::utils::{api_error, now_secs, storage_error, user_account_json};
use crate::storage::{OnboardingUpdate, StorageError, UserRow};
use crate::{auth, avatar};

#[derive(Deserialize)]
pub struct SignupPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    full_name: String,
    profile_pic: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
pub struct OnboardingPayload {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    native_language: String,
    #[serde(default)]
    learning_language: String,
    #[serde(default)]
    location: String,
    profile_pic: Option<String>,
}

/// POST /api/auth/signup
pub async fn signup_handler(
    State(state): State<SharedState>,
    jar: CookieJar,
    axum::Json(req): axum::Json<SignupPayload>,
) -> Response {
    let email = req.email.trim().to_string();
    let full_name = req.full_name.trim().to_string();

    if email.is_empty() || req.password.is_empty() || full_name.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "all fields are required");
    }
    if req.password.chars().count() < 6 {
        return api_error(
            StatusCode::BAD_REQUEST,
            "password must be at least 6 characters",
        );
    }
    if !auth::valid_email(&email) {
        return api_error(StatusCode::BAD_REQUEST, "invalid email format");
    }

    let password_hash = match auth::hash_password(&req.password) {
        Ok(hash) => hash,
        Err(e) => {
            crate::tlog!("auth: password hashing failed: {e}");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    let profile_pic = match req.profile_pic.as_deref() {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => avatar::placeholder_url(&full_name),
    };

    let now = now_secs();
    let user = UserRow {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash,
        full_name,
        bio: String::new(),
        profile_pic,
        native_language: String::new(),
        learning_language: String::new(),
        location: String::new(),
        is_onboarded: false,
        created_at: now,
        updated_at: now,
    };

    let (token, chat) = {
        let st = state.lock().await;
        match st.storage.insert_user(&user) {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                return api_error(
                    StatusCode::CONFLICT,
                    "an account with this email already exists",
                );
            }
            Err(e) => return storage_error(e),
        }
        let token = match auth::create_session_token(&user.id, &st.jwt_secret, now) {
            Ok(token) => token,
            Err(e) => {
                crate::tlog!("auth: session token mint failed: {e}");
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
            }
        };
        (token, st.chat.clone())
    };

    // Mirror the account into the chat provider. Best effort: signup
    // succeeds whether or not the provider is reachable.
    if let Some(chat) = chat {
        if let Err(e) = chat.upsert_user(&user.id, &user.full_name, &user.profile_pic) {
            crate::tlog!("chat: upsert on signup failed (continuing): {e}");
        }
    }

    crate::tlog!("auth: account created {}", crate::logging::user_id(&user.id));

    let body = serde_json::json!({
        "message": "account created",
        "user": user_account_json(&user),
    });
    (
        jar.add(session_cookie(token)),
        (StatusCode::CREATED, axum::Json(body)),
    )
        .into_response()
}

/// POST /api/auth/login
pub async fn login_handler(
    State(state): State<SharedState>,
    jar: CookieJar,
    axum::Json(req): axum::Json<LoginPayload>,
) -> Response {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "email and password are required");
    }

    let (user, token) = {
        let st = state.lock().await;
        let user = match st.storage.get_user_by_email(email) {
            Ok(Some(user)) => user,
            // Unknown email and wrong password must be indistinguishable.
            Ok(None) => {
                return api_error(StatusCode::UNAUTHORIZED, "invalid email or password");
            }
            Err(e) => return storage_error(e),
        };
        if !auth::verify_password(&req.password, &user.password_hash) {
            return api_error(StatusCode::UNAUTHORIZED, "invalid email or password");
        }
        let token = match auth::create_session_token(&user.id, &st.jwt_secret, now_secs()) {
            Ok(token) => token,
            Err(e) => {
                crate::tlog!("auth: session token mint failed: {e}");
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
            }
        };
        (user, token)
    };

    crate::tlog!("auth: login {}", crate::logging::user_id(&user.id));

    let body = serde_json::json!({
        "message": "logged in",
        "user": user_account_json(&user),
    });
    (jar.add(session_cookie(token)), axum::Json(body)).into_response()
}

/// POST /api/auth/logout
///
/// Sessions are stateless, so logout is purely a cookie removal; no auth
/// required, and calling it twice is harmless.
pub async fn logout_handler(jar: CookieJar) -> Response {
    let body = serde_json::json!({ "message": "logged out" });
    (jar.remove(expired_session_cookie()), axum::Json(body)).into_response()
}

/// GET /api/auth/me
pub async fn me_handler(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Response {
    let body = serde_json::json!({ "user": user_account_json(&user) });
    axum::Json(body).into_response()
}

/// POST /api/auth/onboarding
///
/// Completes a profile. Unlike signup, the error body names each missing
/// field so the multi-field form can highlight them.
pub async fn onboarding_handler(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    axum::Json(req): axum::Json<OnboardingPayload>,
) -> Response {
    let required = [
        ("full_name", req.full_name.trim()),
        ("bio", req.bio.trim()),
        ("native_language", req.native_language.trim()),
        ("learning_language", req.learning_language.trim()),
        ("location", req.location.trim()),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        let body = serde_json::json!({
            "error": "all fields are required",
            "missing_fields": missing,
        });
        return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
    }

    let update = OnboardingUpdate {
        full_name: req.full_name.trim().to_string(),
        bio: req.bio.trim().to_string(),
        native_language: req.native_language.trim().to_string(),
        learning_language: req.learning_language.trim().to_string(),
        location: req.location.trim().to_string(),
        profile_pic: req
            .profile_pic
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
    };

    let (updated, chat) = {
        let st = state.lock().await;
        match st.storage.complete_onboarding(&user.id, &update, now_secs()) {
            Ok(true) => {}
            Ok(false) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        }
        let updated = match st.storage.get_user(&user.id) {
            Ok(Some(updated)) => updated,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "user not found"),
            Err(e) => return storage_error(e),
        };
        (updated, st.chat.clone())
    };

    // Keep the chat-provider mirror in sync with the new name and picture.
    if let Some(chat) = chat {
        if let Err(e) = chat.upsert_user(&updated.id, &updated.full_name, &updated.profile_pic) {
            crate::tlog!("chat: upsert on onboarding failed (continuing): {e}");
        }
    }

    crate::tlog!(
        "auth: onboarding complete {}",
        crate::logging::user_id(&updated.id)
    );

    let body = serde_json::json!({
        "message": "onboarding complete",
        "user": user_account_json(&updated),
    });
    axum::Json(body).into_response()
}
