//! HTTP surface tests: the real router served on an ephemeral port,
//! exercised with a plain HTTP client against an in-memory database.

use serde_json::{Value, json};
use uuid::Uuid;

mod test_utils;
use test_utils::{create_connection_with_token, setup_test_db, test_config};

use websync::repositories::SyncAttemptRepository;
use websync::server::{AppState, create_app};

async fn serve_app() -> (String, AppState) {
    let db = setup_test_db().await.expect("db");
    let config = test_config("http://127.0.0.1:9");
    let state = AppState::build(&config, db).expect("build state");

    let app = create_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    (format!("http://{}", addr), state)
}

#[tokio::test]
async fn root_and_health_respond() {
    let (base, _state) = serve_app().await;
    let client = reqwest::Client::new();

    let root: Value = client
        .get(&base)
        .send()
        .await
        .expect("root request")
        .json()
        .await
        .expect("root json");
    assert_eq!(root["service"], "websync");

    let health = client
        .get(format!("{}/healthz", base))
        .send()
        .await
        .expect("health request");
    assert_eq!(health.status(), 200);
}

#[tokio::test]
async fn progress_for_unknown_attempt_is_problem_json_404() {
    let (base, _state) = serve_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/syncs/{}/progress", base, Uuid::new_v4()))
        .send()
        .await
        .expect("progress request");
    assert_eq!(response.status(), 404);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("application/problem+json")
    );

    let body: Value = response.json().await.expect("problem json");
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(body["trace_id"].is_string());
}

#[tokio::test]
async fn start_sync_with_unknown_connection_returns_404() {
    let (base, _state) = serve_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/syncs", base))
        .json(&json!({"connection_id": Uuid::new_v4()}))
        .send()
        .await
        .expect("start request");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn cancel_transitions_exactly_once() {
    let (base, state) = serve_app().await;
    let client = reqwest::Client::new();

    let connection = create_connection_with_token(&state.db, "token")
        .await
        .expect("connection");
    let attempt = SyncAttemptRepository::new(state.db.clone())
        .create(connection.id, "manual", "direct")
        .await
        .expect("create attempt");

    let first: Value = client
        .post(format!("{}/syncs/{}/cancel", base, attempt.id))
        .json(&json!({"reason": "operator requested"}))
        .send()
        .await
        .expect("cancel request")
        .json()
        .await
        .expect("cancel json");
    assert_eq!(first["cancelled"], true);

    // A second cancel finds the attempt already terminal.
    let second: Value = client
        .post(format!("{}/syncs/{}/cancel", base, attempt.id))
        .send()
        .await
        .expect("cancel request")
        .json()
        .await
        .expect("cancel json");
    assert_eq!(second["cancelled"], false);

    let progress: Value = client
        .get(format!("{}/syncs/{}/progress", base, attempt.id))
        .send()
        .await
        .expect("progress request")
        .json()
        .await
        .expect("progress json");
    assert_eq!(progress["status"], "cancelled");
    assert_eq!(progress["error_message"], "operator requested");
}

#[tokio::test]
async fn force_cleanup_cancels_active_attempts_over_http() {
    let (base, state) = serve_app().await;
    let client = reqwest::Client::new();

    let connection = create_connection_with_token(&state.db, "token")
        .await
        .expect("connection");
    let attempts = SyncAttemptRepository::new(state.db.clone());
    attempts
        .create(connection.id, "manual", "direct")
        .await
        .expect("create attempt");

    let cleanup: Value = client
        .post(format!("{}/connections/{}/force-cleanup", base, connection.id))
        .send()
        .await
        .expect("cleanup request")
        .json()
        .await
        .expect("cleanup json");
    assert_eq!(cleanup["cancelled"], 1);

    let listing: Value = client
        .get(format!("{}/connections/{}/attempts/active", base, connection.id))
        .send()
        .await
        .expect("listing request")
        .json()
        .await
        .expect("listing json");
    assert_eq!(listing["attempts"].as_array().map(|a| a.len()), Some(0));
}
