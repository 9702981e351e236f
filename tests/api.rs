//! HTTP-level tests for the ask API.
//!
//! Drives the router in-process with `oneshot`, a canned completion service
//! and an in-memory DuckDB store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use duckdb::Connection;
use tower::ServiceExt; // for oneshot()

use care_ask::answer::{DOMAIN_SCOPE_MESSAGE, EXECUTION_FAILED_MESSAGE, NO_RESULTS_MESSAGE};
use care_ask::ask::{AskResponse, AskService};
use care_ask::completion::{CompletionError, CompletionRequest, CompletionService};
use care_ask::executor::DuckDbExecutor;
use care_ask::schema::PROVIDER_SCHEMA;
use care_ask::server::{AppState, HealthResponse, RootResponse, router};
use care_ask::store::create_schema;
use care_ask::translate::Translator;

struct Canned(Result<&'static str, u16>);

#[async_trait]
impl CompletionService for Canned {
    async fn complete(&self, _: &CompletionRequest) -> Result<String, CompletionError> {
        match self.0 {
            Ok(s) => Ok(s.to_string()),
            Err(status) => Err(CompletionError::Status {
                status,
                body: "unavailable".to_string(),
            }),
        }
    }
}

fn seeded_store(providers: usize) -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    create_schema(&mut conn, &PROVIDER_SCHEMA).unwrap();
    for id in 1..=providers {
        conn.execute(
            "INSERT INTO provider VALUES (?, ?, 'Albany', 'NY', '12208', 'ACTIVE')",
            duckdb::params![id as i64, format!("Hospital {id}")],
        )
        .unwrap();
    }
    conn
}

fn app(reply: Result<&'static str, u16>, providers: usize) -> axum::Router {
    app_with_timeout(reply, providers, Duration::from_secs(30))
}

fn app_with_timeout(
    reply: Result<&'static str, u16>,
    providers: usize,
    query_timeout: Duration,
) -> axum::Router {
    let ask = AskService::new(
        Translator::new(Arc::new(Canned(reply))),
        Arc::new(DuckDbExecutor::with_timeout(
            seeded_store(providers),
            query_timeout,
        )),
        &PROVIDER_SCHEMA,
    );
    router(AppState { ask: Arc::new(ask) })
}

async fn ask(app: axum::Router, question: &str) -> AskResponse {
    let body = serde_json::json!({ "question": question }).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/ask")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn root_and_health() {
    let response = app(Ok("SELECT 1"), 0)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let root: RootResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(root.message, "Healthcare Provider Analysis API");

    let response = app(Ok("SELECT 1"), 0)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn counts_providers() {
    let resp = ask(
        app(Ok("SELECT COUNT(*) AS count FROM provider"), 5),
        "How many providers are there?",
    )
    .await;
    assert_eq!(resp.answer, "1. {count: 5}\n");
}

#[tokio::test]
async fn lists_at_most_ten_rows() {
    let resp = ask(
        app(
            Ok("```sql\nSELECT provider_id FROM provider ORDER BY provider_id\n```"),
            12,
        ),
        "List all providers",
    )
    .await;
    let lines: Vec<&str> = resp.answer.lines().collect();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[0], "1. {provider_id: 1}");
    assert_eq!(lines[10], "... and 2 more results.");
}

#[tokio::test]
async fn conversational_reply_gets_domain_scope() {
    let resp = ask(
        app(Ok("Sorry, I cannot help with that."), 3),
        "What's the capital of France?",
    )
    .await;
    assert_eq!(resp.answer, DOMAIN_SCOPE_MESSAGE);
}

#[tokio::test]
async fn unreachable_service_gets_domain_scope() {
    let resp = ask(app(Err(503), 3), "cheapest hip replacement near 12208").await;
    assert_eq!(resp.answer, DOMAIN_SCOPE_MESSAGE);
}

#[tokio::test]
async fn bad_sql_gets_execution_failure_without_leaking() {
    let resp = ask(
        app(Ok("SELECT * FROM hospitals_that_do_not_exist"), 3),
        "show hospitals",
    )
    .await;
    assert_eq!(resp.answer, EXECUTION_FAILED_MESSAGE);
    assert!(!resp.answer.contains("hospitals_that_do_not_exist"));
}

#[tokio::test]
async fn runaway_query_gets_execution_failure() {
    let app = app_with_timeout(
        Ok("SELECT count(*) AS n FROM range(40000) a, range(40000) b WHERE (a.range * b.range) % 7 = 3"),
        3,
        Duration::from_millis(200),
    );
    let started = std::time::Instant::now();
    let resp = ask(app, "how many pairs of anything").await;
    assert_eq!(resp.answer, EXECUTION_FAILED_MESSAGE);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn empty_result_gets_no_results() {
    let resp = ask(
        app(Ok("SELECT * FROM provider WHERE provider_state = 'TX'"), 3),
        "hospitals in Texas",
    )
    .await;
    assert_eq!(resp.answer, NO_RESULTS_MESSAGE);
}

#[tokio::test]
async fn missing_question_is_rejected_by_extractor() {
    let response = app(Ok("SELECT 1"), 0)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/ask")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"text": "hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
