use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{broadcast, oneshot, Mutex};

use tandem::server::router::build_router;
use tandem::server::state::{AppState, SharedState, WsEvent};
use tandem::storage::Storage;

async fn start_server() -> (String, SharedState, oneshot::Sender<()>) {
    let storage = Storage::open_in_memory().expect("open storage");
    let (ws_tx, _) = broadcast::channel(64);
    let state: SharedState = Arc::new(Mutex::new(AppState {
        storage,
        jwt_secret: "friend-test-secret".to_string(),
        chat: None,
        ws_tx,
        ws_connection_count: Arc::new(AtomicUsize::new(0)),
    }));
    let app = build_router(state.clone());
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

    (format!("http://{}", addr), state, shutdown_tx)
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

fn onboard(base_url: &str, session: &str, full_name: &str) {
    let response = api_request(
        base_url,
        "POST",
        "/api/auth/onboarding",
        Some(session),
        Some(json!({
            "full_name": full_name,
            "bio": "Here to trade languages",
            "native_language": "English",
            "learning_language": "Spanish",
            "location": "Lisbon",
        })),
    );
    assert_eq!(response.status, 200, "onboarding failed: {}", response.body);
}

fn send_request(base_url: &str, session: &str, receiver_id: &str) -> ApiResponse {
    api_request(
        base_url,
        "POST",
        &format!("/api/users/friend-request/{}", receiver_id),
        Some(session),
        None,
    )
}

fn accept_request(base_url: &str, session: &str, request_id: i64) -> ApiResponse {
    api_request(
        base_url,
        "PUT",
        &format!("/api/users/friend-request/{}/accept", request_id),
        Some(session),
        None,
    )
}

async fn next_event(events: &mut broadcast::Receiver<WsEvent>) -> WsEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event wait")
        .expect("event stream")
}

#[tokio::test]
async fn friend_request_lifecycle() {
    let (base_url, state, shutdown_tx) = start_server().await;
    let mut events = state.lock().await.ws_tx.subscribe();

    let (alice_id, bob_id) = tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (alice, alice_id) = signup(&base_url, "Alice Martin", "alice@tandem.io");
            let (bob, bob_id) = signup(&base_url, "Bob Chen", "bob@tandem.io");
            onboard(&base_url, &alice, "Alice Martin");
            onboard(&base_url, &bob, "Bob Chen");

            let sent = send_request(&base_url, &alice, &bob_id);
            assert_eq!(sent.status, 201, "send: {}", sent.body);
            assert_eq!(sent.body["message"], "friend request sent");
            let request = &sent.body["friend_request"];
            assert_eq!(request["sender_id"], alice_id.as_str());
            assert_eq!(request["receiver_id"], bob_id.as_str());
            assert_eq!(request["status"], "pending");
            assert_eq!(request["seen"], false);
            assert_eq!(request["sender"]["full_name"], "Alice Martin");
            assert_eq!(request["receiver"]["full_name"], "Bob Chen");
            let request_id = request["id"].as_i64().expect("request id");

            let outgoing = api_request(
                &base_url,
                "GET",
                "/api/users/outgoing-friends-requests",
                Some(&alice),
                None,
            );
            assert_eq!(outgoing.status, 200);
            let outgoing = outgoing.body.as_array().expect("outgoing array");
            assert_eq!(outgoing.len(), 1);
            assert_eq!(outgoing[0]["receiver"]["id"], bob_id.as_str());

            let listing = api_request(
                &base_url,
                "GET",
                "/api/users/friend-requests",
                Some(&bob),
                None,
            );
            let incoming = listing.body["incoming_requests"]
                .as_array()
                .expect("incoming array");
            assert_eq!(incoming.len(), 1);
            assert_eq!(incoming[0]["sender"]["full_name"], "Alice Martin");
            assert!(listing.body["accepted_requests"]
                .as_array()
                .expect("accepted array")
                .is_empty());

            let accepted = accept_request(&base_url, &bob, request_id);
            assert_eq!(accepted.status, 200, "accept: {}", accepted.body);
            assert_eq!(accepted.body["message"], "friend request accepted");
            let request = &accepted.body["friend_request"];
            assert_eq!(request["status"], "accepted");
            assert_eq!(request["sender"]["id"], alice_id.as_str());
            assert_eq!(request["receiver"]["id"], bob_id.as_str());

            let alice_friends =
                api_request(&base_url, "GET", "/api/users/friends", Some(&alice), None);
            let alice_friends = alice_friends.body.as_array().expect("friends array");
            assert_eq!(alice_friends.len(), 1);
            assert_eq!(alice_friends[0]["id"], bob_id.as_str());

            let bob_friends =
                api_request(&base_url, "GET", "/api/users/friends", Some(&bob), None);
            let bob_friends = bob_friends.body.as_array().expect("friends array");
            assert_eq!(bob_friends.len(), 1);
            assert_eq!(bob_friends[0]["id"], alice_id.as_str());

            // The request moves from the incoming panel to the accepted one.
            let listing = api_request(
                &base_url,
                "GET",
                "/api/users/friend-requests",
                Some(&bob),
                None,
            );
            assert!(listing.body["incoming_requests"]
                .as_array()
                .expect("incoming array")
                .is_empty());
            let accepted_panel = listing.body["accepted_requests"]
                .as_array()
                .expect("accepted array");
            assert_eq!(accepted_panel.len(), 1);
            assert_eq!(accepted_panel[0]["sender"]["full_name"], "Alice Martin");

            let outgoing = api_request(
                &base_url,
                "GET",
                "/api/users/outgoing-friends-requests",
                Some(&alice),
                None,
            );
            assert!(outgoing.body.as_array().expect("outgoing array").is_empty());

            (alice_id, bob_id)
        }
    })
    .await
    .expect("flow task");

    match next_event(&mut events).await {
        WsEvent::FriendRequestReceived {
            sender_id,
            receiver_id,
            sender_name,
            ..
        } => {
            assert_eq!(sender_id, alice_id);
            assert_eq!(receiver_id, bob_id);
            assert_eq!(sender_name, "Alice Martin");
        }
        other => panic!("expected request-received event, got {:?}", other),
    }
    match next_event(&mut events).await {
        WsEvent::FriendRequestAccepted {
            sender_id,
            receiver_name,
            ..
        } => {
            assert_eq!(sender_id, alice_id);
            assert_eq!(receiver_name, "Bob Chen");
        }
        other => panic!("expected request-accepted event, got {:?}", other),
    }

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn duplicate_requests_conflict() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (alice, alice_id) = signup(&base_url, "Alice Martin", "alice@tandem.io");
            let (bob, bob_id) = signup(&base_url, "Bob Chen", "bob@tandem.io");

            let first = send_request(&base_url, &alice, &bob_id);
            assert_eq!(first.status, 201);
            let request_id = first.body["friend_request"]["id"]
                .as_i64()
                .expect("request id");

            let repeat = send_request(&base_url, &alice, &bob_id);
            assert_eq!(repeat.status, 409);
            assert_eq!(
                repeat.body["error"],
                "a friend request already exists between you and this user"
            );

            // The reverse direction is the same pair, so it conflicts too.
            let mirrored = send_request(&base_url, &bob, &alice_id);
            assert_eq!(mirrored.status, 409);
            assert_eq!(
                mirrored.body["error"],
                "a friend request already exists between you and this user"
            );

            let accepted = accept_request(&base_url, &bob, request_id);
            assert_eq!(accepted.status, 200);

            let after_friends = send_request(&base_url, &alice, &bob_id);
            assert_eq!(after_friends.status, 409);
            assert_eq!(
                after_friends.body["error"],
                "you are already friends with this user"
            );
        }
    })
    .await
    .expect("flow task");

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn self_and_unknown_targets_rejected() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (alice, alice_id) = signup(&base_url, "Alice Martin", "alice@tandem.io");

            let to_self = send_request(&base_url, &alice, &alice_id);
            assert_eq!(to_self.status, 400);
            assert_eq!(
                to_self.body["error"],
                "you cannot send a friend request to yourself"
            );

            let to_nobody = send_request(&base_url, &alice, "no-such-user");
            assert_eq!(to_nobody.status, 404);
            assert_eq!(to_nobody.body["error"], "user not found");

            let accept_nothing = accept_request(&base_url, &alice, 999_999);
            assert_eq!(accept_nothing.status, 404);
            assert_eq!(accept_nothing.body["error"], "friend request not found");
        }
    })
    .await
    .expect("flow task");

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn accept_requires_addressee() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (alice, _) = signup(&base_url, "Alice Martin", "alice@tandem.io");
            let (bob, bob_id) = signup(&base_url, "Bob Chen", "bob@tandem.io");
            let (carol, _) = signup(&base_url, "Carol Diaz", "carol@tandem.io");

            let sent = send_request(&base_url, &alice, &bob_id);
            let request_id = sent.body["friend_request"]["id"]
                .as_i64()
                .expect("request id");

            let bystander = accept_request(&base_url, &carol, request_id);
            assert_eq!(bystander.status, 403);
            assert_eq!(
                bystander.body["error"],
                "you are not authorized to accept this friend request"
            );

            // The sender cannot accept on the receiver's behalf.
            let sender_side = accept_request(&base_url, &alice, request_id);
            assert_eq!(sender_side.status, 403);

            let accepted = accept_request(&base_url, &bob, request_id);
            assert_eq!(accepted.status, 200);

            let again = accept_request(&base_url, &bob, request_id);
            assert_eq!(again.status, 409);
            assert_eq!(again.body["error"], "friend request is already accepted");
        }
    })
    .await
    .expect("flow task");

    shutdown_tx.send(()).ok();
}

#[tokio::test]
async fn recommendations_exclude_self_friends_and_unonboarded() {
    let (base_url, _state, shutdown_tx) = start_server().await;

    tokio::task::spawn_blocking({
        let base_url = base_url.clone();
        move || {
            let (alice, alice_id) = signup(&base_url, "Alice Martin", "alice@tandem.io");
            let (bob, bob_id) = signup(&base_url, "Bob Chen", "bob@tandem.io");
            let (carol, carol_id) = signup(&base_url, "Carol Diaz", "carol@tandem.io");
            onboard(&base_url, &alice, "Alice Martin");
            onboard(&base_url, &bob, "Bob Chen");

            // Carol has not onboarded, so only Bob is recommendable to Alice.
            let recommended = api_request(&base_url, "GET", "/api/users", Some(&alice), None);
            assert_eq!(recommended.status, 200);
            let users = recommended.body["recommended_users"]
                .as_array()
                .expect("recommended array");
            assert_eq!(users.len(), 1);
            assert_eq!(users[0]["id"], bob_id.as_str());

            let sent = send_request(&base_url, &alice, &bob_id);
            let request_id = sent.body["friend_request"]["id"]
                .as_i64()
                .expect("request id");
            accept_request(&base_url, &bob, request_id);

            let recommended = api_request(&base_url, "GET", "/api/users", Some(&alice), None);
            assert!(recommended.body["recommended_users"]
                .as_array()
                .expect("recommended array")
                .is_empty());

            onboard(&base_url, &carol, "Carol Diaz");

            let recommended = api_request(&base_url, "GET", "/api/users", Some(&alice), None);
            let users = recommended.body["recommended_users"]
                .as_array()
                .expect("recommended array");
            assert_eq!(users.len(), 1);
            assert_eq!(users[0]["id"], carol_id.as_str());

            // Carol sees both existing members; their friendship does not
            // involve her.
            let recommended = api_request(&base_url, "GET", "/api/users", Some(&carol), None);
            let users = recommended.body["recommended_users"]
                .as_array()
                .expect("recommended array");
            assert_eq!(users.len(), 2);
            let ids: Vec<&str> = users.iter().filter_map(|u| u["id"].as_str()).collect();
            assert!(ids.contains(&alice_id.as_str()));
            assert!(ids.contains(&bob_id.as_str()));
        }
    })
    .await
    .expect("flow task");

    shutdown_tx.send(()).ok();
}
