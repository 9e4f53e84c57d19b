//! HTTP surface for the wireflow workflow execution engine (§6).
//!
//! `POST /run` accepts a workflow, drives it to completion through
//! `wireflow-core`, and returns the full execution trace. `GET /health` is
//! a liveness probe. Everything else — persistence, auth, streaming
//! intermediate results — is explicitly out of scope (§1).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use wireflow_core::{assembler, executor::NodeExecutorRegistry, runtime::RuntimeConfig, scheduler};
use wireflow_types::Workflow;

#[derive(Clone)]
struct AppState {
    registry: Arc<NodeExecutorRegistry>,
    config: Arc<RuntimeConfig>,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    workflow: Workflow,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn run_workflow(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> (StatusCode, Json<assembler::RunResponse>) {
    let started = Instant::now();
    let result = scheduler::execute_workflow(&request.workflow, &state.registry, &state.config).await;
    if let Some((node_id, message)) = &result.error {
        error!(node_id, message, "workflow run finished with an error");
    } else {
        info!(nodes = result.outcomes.len(), "workflow run finished successfully");
    }
    let response = assembler::assemble(&result, started.elapsed().as_secs_f64());
    // §7 "User-visible behaviour": the trace is always 200, even on a node
    // failure; only a framework-level crash (never reached here, since
    // execute_workflow collapses every failure into the trace) would be
    // non-200.
    (StatusCode::OK, Json(response))
}

/// Allow local origins `http://localhost:3000` through `:3010` (§6 "CORS").
fn local_origin_allowed(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else { return false };
    for host in ["localhost", "127.0.0.1"] {
        let prefix = format!("http://{host}:");
        if let Some(port_str) = origin.strip_prefix(&prefix) {
            if let Ok(port) = port_str.parse::<u16>() {
                if (3000..=3010).contains(&port) {
                    return true;
                }
            }
        }
    }
    false
}

fn build_router(state: AppState) -> Router {
    // `allow_credentials(true)` forbids the `Any` wildcard for methods and
    // headers (the CORS spec requires an explicit list once credentials are
    // allowed); this mirrors the spec's "all methods and headers" intent
    // with the concrete set the engine's surface actually exposes.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _parts| local_origin_allowed(origin)))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request());

    Router::new()
        .route("/run", post(run_workflow))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RuntimeConfig::from_env();
    config.ensure_roots()?;

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = AppState { registry: Arc::new(NodeExecutorRegistry::new()), config: Arc::new(config) };

    info!(%addr, "starting wireflow engine");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
