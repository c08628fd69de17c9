//! Session cookie plumbing and the authentication middleware.
//!
//! The session is a JWT carried in an HttpOnly cookie. The middleware here
//! guards every route that acts on behalf of a user: it resolves the cookie
//! to a live account row and hands that row to handlers as a [`CurrentUser`]
//! extension, so handlers never re-derive identity themselves.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth;
use crate::server::state::SharedState;
use crate::server::utils::{api_error, storage_error};
use crate::storage::UserRow;

pub const SESSION_COOKIE: &str = "tandem_session";

/// The authenticated account, inserted by [`require_session`] and extracted
/// by handlers via `Extension<CurrentUser>`.
#[derive(Clone)]
pub struct CurrentUser(pub UserRow);

/// Cookie carrying a freshly minted session token. HttpOnly and
/// SameSite=Strict: the browser SDK never needs to read it, and
/// cross-site requests must not carry it.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(7))
        .build()
}

/// Named cookie used to instruct the jar to expire the session.
pub fn expired_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookie
}

/// Middleware for all routes that require a signed-in user.
///
/// A token that validates but points at a user row that no longer exists is
/// treated the same as no token at all.
pub async fn require_session(
    State(state): State<SharedState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return api_error(StatusCode::UNAUTHORIZED, "unauthorized: no session");
    };

    let user = {
        let st = state.lock().await;
        let user_id = match auth::verify_session_token(cookie.value(), &st.jwt_secret) {
            Ok(uid) => uid,
            Err(_) => {
                return api_error(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized: invalid or expired session",
                );
            }
        };
        match st.storage.get_user(&user_id) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return api_error(StatusCode::UNAUTHORIZED, "unauthorized: unknown user");
            }
            Err(e) => return storage_error(e),
        }
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}
