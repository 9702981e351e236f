use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::ask::{AskRequest, AskResponse, AskService};
use crate::cli::ServeArgs;
use crate::completion::OpenAiCompletion;
use crate::executor::DuckDbExecutor;
use crate::schema::PROVIDER_SCHEMA;
use crate::storage::StoragePaths;
use crate::store;
use crate::translate::Translator;

#[derive(Clone)]
pub struct AppState {
    pub ask: Arc<AskService>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let paths = StoragePaths::new(&opts.data_dir);
    let conn = store::open_existing(&paths)?;

    if opts.completion.openai_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; every question will get the domain-scope reply");
    }
    let completion =
        OpenAiCompletion::new(opts.completion.to_config()).context("build completion client")?;

    let state = AppState {
        ask: Arc::new(AskService::new(
            Translator::new(Arc::new(completion)),
            Arc::new(DuckDbExecutor::with_timeout(conn, opts.query_timeout())),
            &PROVIDER_SCHEMA,
        )),
    };

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api_root))
        .route("/health", get(api_health))
        .route("/api/v1/ask", post(api_ask))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn api_root() -> impl IntoResponse {
    Json(RootResponse {
        message: "Healthcare Provider Analysis API".to_string(),
    })
}

async fn api_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

async fn api_ask(State(st): State<AppState>, Json(req): Json<AskRequest>) -> Json<AskResponse> {
    Json(st.ask.ask(&req.question).await)
}
