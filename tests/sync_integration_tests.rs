//! End-to-end sync tests against a mock provider API and an in-memory
//! database: pagination, rate-limit handling, replace-on-resync, stale
//! attempt cleanup, and the remote-to-direct fallback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use sea_orm::ColumnTrait;
use serde_json::json;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param, query_param_is_missing},
};

mod test_utils;
use test_utils::{attendance_json, create_connection_with_token, setup_test_db, test_config, webinar_json};

use websync::config::AppConfig;
use websync::models::sync_attempt;
use websync::orchestrator::SyncOrchestrator;
use websync::repositories::{
    ParticipantSessionRepository, SyncAttemptRepository, WebinarRepository,
};

const TOKEN: &str = "test-provider-token";

/// Start a sync and wait for the attempt to reach a terminal state.
async fn run_sync_to_terminal(
    db: &DatabaseConnection,
    config: &AppConfig,
    connection_id: Uuid,
) -> sync_attempt::Model {
    let orchestrator =
        Arc::new(SyncOrchestrator::new(db.clone(), config).expect("build orchestrator"));
    let attempt_id = orchestrator
        .start_sync(connection_id, "manual")
        .await
        .expect("start sync");

    let attempts = SyncAttemptRepository::new(db.clone());
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let attempt = attempts
            .find_by_id(attempt_id)
            .await
            .expect("find attempt")
            .expect("attempt exists");
        if sync_attempt::is_terminal_status(&attempt.status) {
            return attempt;
        }
        assert!(
            Instant::now() < deadline,
            "attempt {} still {} after 20s",
            attempt_id,
            attempt.status
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn mount_webinar_with_participants(
    server: &MockServer,
    webinar_id: &str,
    participants: Vec<serde_json::Value>,
) {
    Mock::given(method("GET"))
        .and(path(format!("/webinars/{}", webinar_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(webinar_json(webinar_id, "Quarterly Review")),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/report/webinars/{}/participants", webinar_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "participants": participants,
            "next_page_token": ""
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn happy_path_stores_sessions_and_completes() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("801", "Quarterly Review")],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;

    // Alice drops and rejoins; each interval is its own session.
    mount_webinar_with_participants(
        &server,
        "801",
        vec![
            attendance_json("alice@example.com", "Alice", "2026-03-10T17:00:05Z", "2026-03-10T17:20:00Z"),
            attendance_json("alice@example.com", "Alice", "2026-03-10T17:25:00Z", "2026-03-10T18:00:00Z"),
            attendance_json("bob@example.com", "Bob", "2026-03-10T17:01:00Z", "2026-03-10T18:00:00Z"),
        ],
    )
    .await;

    let attempt = run_sync_to_terminal(&db, &test_config(&server.uri()), connection.id).await;
    assert_eq!(attempt.status, "completed");
    assert_eq!(attempt.execution_path, "direct");
    assert!(attempt.completed_at.is_some());
    assert!(attempt.error_message.is_none());

    let webinars = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    assert_eq!(webinars.len(), 1);
    assert_eq!(webinars[0].provider_webinar_id, "801");
    assert_eq!(webinars[0].topic, "Quarterly Review");
    assert_eq!(webinars[0].total_attendees, 3);

    let sessions = ParticipantSessionRepository::new(db.clone())
        .list_for_webinar(webinars[0].id)
        .await
        .expect("list sessions");
    assert_eq!(sessions.len(), 3);
    let alice_sessions = sessions
        .iter()
        .filter(|s| s.email.as_deref() == Some("alice@example.com"))
        .count();
    assert_eq!(alice_sessions, 2);
}

#[tokio::test]
async fn pagination_unions_every_page_exactly_once() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .and(query_param_is_missing("next_page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("101", "Page One")],
            "next_page_token": "t2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .and(query_param("next_page_token", "t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("102", "Page Two")],
            "next_page_token": "t3"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .and(query_param("next_page_token", "t3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("103", "Page Three")],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;

    for id in ["101", "102", "103"] {
        mount_webinar_with_participants(
            &server,
            id,
            vec![attendance_json(
                "solo@example.com",
                "Solo",
                "2026-03-10T17:00:00Z",
                "2026-03-10T18:00:00Z",
            )],
        )
        .await;
    }

    let attempt = run_sync_to_terminal(&db, &test_config(&server.uri()), connection.id).await;
    assert_eq!(attempt.status, "completed");

    let webinars = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    let mut ids: Vec<_> = webinars
        .iter()
        .map(|w| w.provider_webinar_id.clone())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["101", "102", "103"]);
}

#[tokio::test]
async fn rate_limited_page_waits_and_resumes() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    // First listing request is rejected with a one-second Retry-After;
    // the retry must succeed without consuming the transient budget.
    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("201", "After The Wait")],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;

    mount_webinar_with_participants(
        &server,
        "201",
        vec![attendance_json(
            "carol@example.com",
            "Carol",
            "2026-03-10T17:00:00Z",
            "2026-03-10T18:00:00Z",
        )],
    )
    .await;

    let started = Instant::now();
    let attempt = run_sync_to_terminal(&db, &test_config(&server.uri()), connection.id).await;

    assert_eq!(attempt.status, "completed");
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "sync finished without honoring Retry-After"
    );

    let webinars = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    assert_eq!(webinars.len(), 1);
}

#[tokio::test]
async fn total_provider_outage_fails_the_attempt() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    // Every listing request fails; no page is ever fetched.
    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let attempt = run_sync_to_terminal(&db, &test_config(&server.uri()), connection.id).await;
    assert_eq!(attempt.status, "failed");
    assert!(attempt.error_message.is_some());

    let webinars = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    assert!(webinars.is_empty());
}

#[tokio::test]
async fn listing_degrades_to_partial_results_after_the_first_page() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .and(query_param_is_missing("next_page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("501", "Before The Outage")],
            "next_page_token": "t2"
        })))
        .mount(&server)
        .await;
    // The second page never recovers; the walk ends with what it has.
    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .and(query_param("next_page_token", "t2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    mount_webinar_with_participants(
        &server,
        "501",
        vec![attendance_json(
            "gail@example.com",
            "Gail",
            "2026-03-10T17:00:00Z",
            "2026-03-10T18:00:00Z",
        )],
    )
    .await;

    let attempt = run_sync_to_terminal(&db, &test_config(&server.uri()), connection.id).await;
    assert_eq!(attempt.status, "completed");

    let webinars = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    assert_eq!(webinars.len(), 1);
    assert_eq!(webinars[0].provider_webinar_id, "501");
}

#[tokio::test]
async fn resync_replaces_sessions_idempotently() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("301", "Recurring Topic")],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;
    mount_webinar_with_participants(
        &server,
        "301",
        vec![
            attendance_json("dina@example.com", "Dina", "2026-03-10T17:00:00Z", "2026-03-10T17:30:00Z"),
            attendance_json("evan@example.com", "Evan", "2026-03-10T17:05:00Z", "2026-03-10T18:00:00Z"),
        ],
    )
    .await;

    let config = test_config(&server.uri());

    let first = run_sync_to_terminal(&db, &config, connection.id).await;
    assert_eq!(first.status, "completed");

    let webinars = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    assert_eq!(webinars.len(), 1);
    let session_repo = ParticipantSessionRepository::new(db.clone());
    let first_keys: Vec<String> = session_repo
        .list_for_webinar(webinars[0].id)
        .await
        .expect("list sessions")
        .into_iter()
        .map(|s| s.session_key)
        .collect();
    assert_eq!(first_keys.len(), 2);

    let second = run_sync_to_terminal(&db, &config, connection.id).await;
    assert_eq!(second.status, "completed");

    let webinars_after = WebinarRepository::new(db.clone())
        .list_for_connection(connection.id)
        .await
        .expect("list webinars");
    assert_eq!(webinars_after.len(), 1);
    assert_eq!(webinars_after[0].id, webinars[0].id);

    let second_keys: Vec<String> = session_repo
        .list_for_webinar(webinars[0].id)
        .await
        .expect("list sessions")
        .into_iter()
        .map(|s| s.session_key)
        .collect();
    assert_eq!(first_keys, second_keys);
}

#[tokio::test]
async fn lingering_attempt_is_cancelled_before_a_new_sync() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    // A sync that died mid-flight an hour ago, never finalized.
    let stale_id = Uuid::new_v4();
    let then = (chrono::Utc::now() - chrono::Duration::seconds(3600)).fixed_offset();
    sync_attempt::Entity::insert(sync_attempt::ActiveModel {
        id: Set(stale_id),
        connection_id: Set(connection.id),
        sync_type: Set("manual".to_string()),
        status: Set("in_progress".to_string()),
        stage: Set("participants".to_string()),
        execution_path: Set("direct".to_string()),
        processed_items: Set(3),
        total_items: Set(10),
        stage_progress_pct: Set(30),
        error_message: Set(None),
        started_at: Set(then),
        completed_at: Set(None),
        updated_at: Set(then),
    })
    .exec_without_returning(&db)
    .await
    .expect("insert stale attempt");

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;

    let attempt = run_sync_to_terminal(&db, &test_config(&server.uri()), connection.id).await;
    assert_eq!(attempt.status, "completed");
    assert_ne!(attempt.id, stale_id);

    let stale = SyncAttemptRepository::new(db.clone())
        .find_by_id(stale_id)
        .await
        .expect("find stale")
        .expect("stale exists");
    assert_eq!(stale.status, "cancelled");
    // Partial progress from the dead run is retained for inspection.
    assert_eq!(stale.processed_items, 3);

    let active = SyncAttemptRepository::new(db.clone())
        .find_active_for_connection(connection.id)
        .await
        .expect("list active");
    assert!(active.is_empty());
}

#[tokio::test]
async fn unreachable_remote_worker_falls_back_to_direct() {
    let server = MockServer::start().await;
    let db = setup_test_db().await.expect("db");
    let connection = create_connection_with_token(&db, TOKEN).await.expect("connection");

    Mock::given(method("GET"))
        .and(path("/users/me/webinars"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "webinars": [webinar_json("401", "Fallback Run")],
            "next_page_token": ""
        })))
        .mount(&server)
        .await;
    mount_webinar_with_participants(
        &server,
        "401",
        vec![attendance_json(
            "fred@example.com",
            "Fred",
            "2026-03-10T17:00:00Z",
            "2026-03-10T18:00:00Z",
        )],
    )
    .await;

    let mut config = test_config(&server.uri());
    // Discard port: the health probe fails fast and delegation is skipped.
    config.remote_worker_base = Some("http://127.0.0.1:9".to_string());

    let attempt = run_sync_to_terminal(&db, &config, connection.id).await;
    assert_eq!(attempt.status, "completed");
    assert_eq!(attempt.execution_path, "direct");

    // The fallback never produces a second attempt row.
    let total_attempts = sync_attempt::Entity::find()
        .filter(sync_attempt::Column::ConnectionId.eq(connection.id))
        .count(&db)
        .await
        .expect("count attempts");
    assert_eq!(total_attempts, 1);
}
