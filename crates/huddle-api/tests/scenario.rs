use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use huddle_api::credentials::create_token;
use huddle_api::routes::router;
use huddle_api::{AppState, AppStateInner, AuthConfig};
use huddle_db::Database;
use huddle_db::models::NewUser;
use huddle_gateway::dispatcher::Dispatcher;
use huddle_mail::{MailConfig, MailWorker, RecordingTransport};
use huddle_types::models::User;

struct TestApp {
    state: AppState,
    transport: Arc<RecordingTransport>,
    worker: MailWorker,
}

impl TestApp {
    fn new() -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let config = MailConfig {
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let (mailer, worker) = huddle_mail::spawn(config, transport.clone());
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            dispatcher: Dispatcher::new(),
            mailer,
            auth: AuthConfig {
                jwt_secret: "scenario-secret".into(),
                token_ttl: chrono::Duration::hours(1),
            },
        });
        Self {
            state,
            transport,
            worker,
        }
    }

    fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Insert a user directly and mint a bearer token for it.
    fn user(&self, name: &str) -> (User, String) {
        let user = self
            .state
            .db
            .create_user(&NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: "unused".into(),
                avatar: format!("https://robohash.org/{}", name),
                verification_token: format!("{}-TOKEN", name.to_uppercase()),
                verification_token_expiry: Utc::now() + chrono::Duration::hours(1),
            })
            .unwrap();
        let token = create_token(&self.state.auth, user.id, &user.username).unwrap();
        (user, token)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

#[tokio::test]
async fn workspace_dm_and_broadcast_scenario() {
    let app = TestApp::new();
    let (u1, t1) = app.user("alice");
    let (u2, t2) = app.user("bob");
    let (_u3, t3) = app.user("carol");

    // U1 creates "Eng": one channel "general", one admin member.
    let (status, body) = app
        .call(Method::POST, "/workspaces", Some(&t1), Some(json!({ "name": "Eng" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], json!(true));
    let ws = &body["data"];
    let ws_id = ws["id"].as_str().unwrap().to_string();
    assert_eq!(ws["channels"].as_array().unwrap().len(), 1);
    assert_eq!(ws["channels"][0]["name"], json!("general"));
    assert_eq!(ws["members"].as_array().unwrap().len(), 1);
    assert_eq!(ws["members"][0]["member_id"], json!(u1.id));
    assert_eq!(ws["members"][0]["role"], json!("admin"));

    // U1 adds U2 as a member through the dispatching POST.
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/workspaces/{}", ws_id),
            Some(&t1),
            Some(json!({ "member_id": u2.id, "role": "member" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);

    // U1 opens a DM with U2, then U2 opens one with U1: same room.
    let (status, body) = app
        .call(
            Method::POST,
            "/dms/start",
            Some(&t1),
            Some(json!({ "recipient_id": u2.id, "workspace_id": ws_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .call(
            Method::POST,
            "/dms/start",
            Some(&t2),
            Some(json!({ "recipient_id": u1.id, "workspace_id": ws_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(room_id));

    // A subscriber on the room sees the message.
    let mut rx = app.state.dispatcher.subscribe();
    let (status, body) = app
        .call(
            Method::POST,
            &format!("/dms/{}/message", room_id),
            Some(&t1),
            Some(json!({ "body": "hi" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let message_id = body["data"]["id"].clone();
    assert_eq!(body["data"]["room_id"], json!(room_id));
    assert_eq!(body["data"]["sender"]["id"], json!(u1.id));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.scope.map(|id| id.to_string()), Some(room_id.clone()));
    let event: Value = serde_json::from_str(&event.json).unwrap();
    assert_eq!(event["type"], json!("MessageReceived"));
    assert_eq!(event["data"]["message"]["id"], message_id);

    let (status, body) = app
        .call(Method::GET, &format!("/dms/{}", room_id), Some(&t2), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["room"]["last_message_id"], message_id);
    assert_eq!(body["data"]["messages"].as_array().unwrap().len(), 1);

    // Non-member U3 cannot read the DM.
    let (status, body) = app
        .call(Method::GET, &format!("/dms/{}", room_id), Some(&t3), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    // The add-member notification went to U2.
    let TestApp { transport, worker, .. } = app;
    worker.shutdown().await;
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, u2.email);
    assert_eq!(sent[0].subject, "You have been added to a workspace");
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let app = TestApp::new();

    let (status, body) = app.call(Method::GET, "/workspaces", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, _) = app.call(Method::GET, "/workspaces", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn self_dm_is_a_bad_request() {
    let app = TestApp::new();
    let (u1, t1) = app.user("alice");
    let (_, body) = app
        .call(Method::POST, "/workspaces", Some(&t1), Some(json!({ "name": "Eng" })))
        .await;
    let ws_id = body["data"]["id"].clone();

    let (status, body) = app
        .call(
            Method::POST,
            "/dms/start",
            Some(&t1),
            Some(json!({ "recipient_id": u1.id, "workspace_id": ws_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Cannot create DM with yourself"));
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
    let app = TestApp::new();
    let (_, t1) = app.user("alice");

    let (status, body) = app
        .call(Method::POST, "/workspaces", Some(&t1), Some(json!({ "title": "Eng" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn channel_messages_round_trip_over_http() {
    let app = TestApp::new();
    let (_, t1) = app.user("alice");
    let (_, t3) = app.user("carol");
    let (_, body) = app
        .call(Method::POST, "/workspaces", Some(&t1), Some(json!({ "name": "Eng" })))
        .await;
    let general = body["data"]["channels"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/channels/{}/messages", general),
            Some(&t1),
            Some(json!({ "body": "hello team" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/channels/{}/messages?page=1&limit=10", general),
            Some(&t1),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["body"], json!("hello team"));
    assert_eq!(body["data"][0]["channel_id"], json!(general));

    let (status, _) = app
        .call(Method::GET, &format!("/channels/{}", general), Some(&t3), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_of_deleted_accounts_are_rejected() {
    let app = TestApp::new();
    let (_, t1) = app.user("alice");
    let (_, t2) = app.user("bob");
    let (_, body) = app
        .call(Method::POST, "/workspaces", Some(&t1), Some(json!({ "name": "Eng" })))
        .await;
    let ws_id = body["data"]["id"].as_str().unwrap().to_string();
    let join_code = body["data"]["join_code"].clone();

    let (status, _) = app.call(Method::DELETE, "/users/me", Some(&t2), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .call(Method::POST, "/workspaces", Some(&t2), Some(json!({ "name": "Mine" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Authentication required"));

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/workspaces/{}/join", ws_id),
            Some(&t2),
            Some(json!({ "join_code": join_code })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
