use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot, Mutex};

use tandem::server::router::build_router;
use tandem::server::state::AppState;
use tandem::storage::Storage;
use tandem::stream_chat::StreamChat;

async fn start_server(chat: Option<StreamChat>) -> (String, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    let (ws_tx, _) = broadcast::channel(64);
    let state = Arc::new(Mutex::new(AppState {
        storage,
        jwt_secret: "chat-test-secret".to_string(),
        chat,
        ws_tx,
        ws_connection_count: Arc::new(AtomicUsize::new(0)),
    }));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("http://{}", addr), shutdown_tx)
}

/// Provider config whose endpoint is a closed local port, for exercising
/// the paths that must survive an unreachable provider.
fn unreachable_provider() -> StreamChat {
    StreamChat::new(
        "key123".to_string(),
        "secret456".to_string(),
        "http://127.0.0.1:9".to_string(),
    )
}

struct ApiResponse {
    status: u16,
    set_cookie: Option<String>,
    body: Value,
}

fn api_request(
    base_url: &str,
    method: &str,
    path: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> ApiResponse {
    let mut request = ureq::request(method, &format!("{}{}", base_url, path));
    if let Some(token) = session {
        request = request.set("Cookie", &format!("tandem_session={}", token));
    }
    let result = match body {
        Some(body) => request.send_json(body),
        None => request.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(error) => panic!("request to {} failed: {}", path, error),
    };
    let status = response.status();
    let set_cookie = response.header("set-cookie").map(str::to_string);
    let text = response.into_string().expect("response body");
    let body = serde_json::from_str(&text).expect("json body");
    ApiResponse {
        status,
        set_cookie,
        body,
    }
}

fn signup(base_url: &str, full_name: &str, email: &str) -> (String, String) {
    let response = api_request(
        base_url,
        "POST",
        "/api/auth/signup",
        None,
        Some(json!({
            "full_name": full_name,
            "email": email,
            "password": "secret123",
        })),
    );
    assert_eq!(response.status, 201, "signup failed: {}", response.body);
    let cookie = response.set_cookie.as_deref().expect("set-cookie header");
    let pair = cookie.split(';').next().expect("cookie pair");
    let session = pair
        .split_once('=')
        .expect("cookie value")
        .1
        .to_string();
    let user_id = response.body["user"]["id"]
        .as_str()
        .expect("user id")
        .to_string();
    (session, user_id)
}

#[derive(serde::Deserialize)]
struct ChatTokenClaims {
    user_id: String,
}

#[tokio::test]
async fn chat_token_requires_configured_provider() {
    let (base_url, shutdown_tx) = start_server(None).await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (session, _) = signup(&base_url, "Ada Lovelace", "ada@tandem.io");
            let response = api_request(&base_url, "GET", "/api/chat/token", Some(&session), None);
            assert_eq!(response.status, 503);
            assert_eq!(response.body["error"], "chat provider is not configured");
        }
    })
    .await
    .expect("request task");

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn chat_token_minted_for_session_user() {
    let (base_url, shutdown_tx) = start_server(Some(unreachable_provider())).await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (session, user_id) = signup(&base_url, "Ada Lovelace", "ada@tandem.io");

            let health = api_request(&base_url, "GET", "/api/health", None, None);
            assert_eq!(health.body["chat_enabled"], true);

            let response = api_request(&base_url, "GET", "/api/chat/token", Some(&session), None);
            assert_eq!(response.status, 200, "token: {}", response.body);
            assert_eq!(response.body["api_key"], "key123");
            assert_eq!(response.body["user_id"], user_id.as_str());

            let token = response.body["token"].as_str().expect("token string");
            let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
            validation.required_spec_claims.clear();
            validation.validate_exp = false;
            let decoded = jsonwebtoken::decode::<ChatTokenClaims>(
                token,
                &jsonwebtoken::DecodingKey::from_secret(b"secret456"),
                &validation,
            )
            .expect("decode chat token");
            assert_eq!(decoded.claims.user_id, user_id);
        }
    })
    .await
    .expect("request task");

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn signup_continues_when_chat_provider_unreachable() {
    let (base_url, shutdown_tx) = start_server(Some(unreachable_provider())).await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            // The provider upsert fails on both paths that attempt it; the
            // account flow must not care.
            let (session, user_id) = signup(&base_url, "Ada Lovelace", "ada@tandem.io");

            let onboarding = api_request(
                &base_url,
                "POST",
                "/api/auth/onboarding",
                Some(&session),
                Some(json!({
                    "full_name": "Ada Lovelace",
                    "bio": "Mathematician, learning Italian",
                    "native_language": "English",
                    "learning_language": "Italian",
                    "location": "London",
                })),
            );
            assert_eq!(onboarding.status, 200, "onboarding: {}", onboarding.body);

            let me = api_request(&base_url, "GET", "/api/auth/me", Some(&session), None);
            assert_eq!(me.status, 200);
            assert_eq!(me.body["user"]["id"], user_id.as_str());
            assert_eq!(me.body["user"]["is_onboarded"], true);
        }
    })
    .await
    .expect("request task");

    shutdown_tx.send(()).ok();
}
