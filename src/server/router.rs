//! Axum router construction.

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;

use crate::server::handlers;
use crate::server::session::require_session;
use crate::server::state::SharedState;

/// Build the complete Axum router.
///
/// Signup, login, logout, and the health check are reachable without a
/// session; everything else sits behind the session middleware.
pub fn build_router(state: SharedState) -> Router {
    let public = Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        .route("/api/auth/signup", post(handlers::auth::signup_handler))
        .route("/api/auth/login", post(handlers::auth::login_handler))
        .route("/api/auth/logout", post(handlers::auth::logout_handler));

    let protected = Router::new()
        // Account
        .route("/api/auth/me", get(handlers::auth::me_handler))
        .route(
            "/api/auth/onboarding",
            post(handlers::auth::onboarding_handler),
        )
        // User directory
        .route("/api/users", get(handlers::users::recommended_users_handler))
        .route("/api/users/friends", get(handlers::users::friends_handler))
        // Friend requests
        .route(
            "/api/users/friend-request/:id",
            post(handlers::friends::send_request_handler),
        )
        .route(
            "/api/users/friend-request/:id/accept",
            put(handlers::friends::accept_request_handler),
        )
        .route(
            "/api/users/friend-requests",
            get(handlers::friends::list_requests_handler),
        )
        // Path name kept verbatim from the original API, plural and all;
        // deployed clients request it this way.
        .route(
            "/api/users/outgoing-friends-requests",
            get(handlers::friends::outgoing_requests_handler),
        )
        // Notifications
        .route(
            "/api/users/unseen-friend-requests",
            get(handlers::notifications::unseen_requests_handler),
        )
        .route(
            "/api/users/friend-requests/mark-seen",
            put(handlers::notifications::mark_seen_handler),
        )
        // Chat provider
        .route("/api/chat/token", get(handlers::chat::chat_token_handler))
        // WebSocket
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    public.merge(protected).with_state(state)
}
