use std::{any::Any, sync::Arc, time::Instant};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{MatchedPath, Request, State},
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::task;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::warn;

use crate::{
    error::ServiceError,
    generation::GenerationEngine,
    metrics::{GENERATE_ENDPOINT, Metrics},
    model::GenerationResult,
};

pub const MISSING_PRODUCT_NAME: &str = "Missing 'product_name' in request body";
pub const PRODUCT_NAME_NOT_STRING: &str = "'product_name' must be a string";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GenerationEngine>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(engine: Arc<GenerationEngine>, metrics: Arc<Metrics>) -> Router {
    let state = AppState { engine, metrics };

    let routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/generate", post(generate_ad))
        .route("/metrics", get(export_metrics));

    instrument(routes, state)
}

/// Adds the fallback and the shared layers, which wrap every route and the
/// fallback. Panics are caught inside the metrics layer so they are still
/// counted.
fn instrument(routes: Router<AppState>, state: AppState) -> Router {
    routes
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Metrics label for a matched route. `unknown` when nothing matched or the
/// method is not one the route serves (405).
pub fn endpoint_label(method: &Method, matched: Option<&str>) -> &'static str {
    let readable = *method == Method::GET || *method == Method::HEAD;
    match matched {
        Some("/") if readable => "root",
        Some("/health") if readable => "health",
        Some("/generate") if *method == Method::POST => GENERATE_ENDPOINT,
        Some("/metrics") if readable => "metrics",
        _ => "unknown",
    }
}

async fn track_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let endpoint = endpoint_label(
        &method,
        request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str),
    );

    let response = next.run(request).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    if let Err(err) = state
        .metrics
        .record_request(method.as_str(), endpoint, status, latency)
    {
        warn!(error = %err, endpoint, "failed to record request metrics");
    }
    if endpoint == GENERATE_ENDPOINT {
        if let Err(err) = state.metrics.record_generation(latency) {
            warn!(error = %err, "failed to record generation metrics");
        }
    }

    response
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Ad Generator API is running" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn generate_ad(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerationResult>, ServiceError> {
    let product_name = parse_product_name(&body)?;

    let engine = state.engine.clone();
    let prompt_input = product_name.clone();
    let generated_ad = task::spawn_blocking(move || engine.generate(&prompt_input))
        .await
        .map_err(|err| ServiceError::Internal(format!("generation task failed: {err}")))??;

    Ok(Json(GenerationResult {
        product_name,
        generated_ad,
    }))
}

/// Missing or unparsable bodies count as a missing key.
fn parse_product_name(body: &[u8]) -> Result<String, ServiceError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| ServiceError::InvalidRequest(MISSING_PRODUCT_NAME.into()))?;

    match value.get("product_name") {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(_) => Err(ServiceError::InvalidRequest(PRODUCT_NAME_NOT_STRING.into())),
        None => Err(ServiceError::InvalidRequest(MISSING_PRODUCT_NAME.into())),
    }
}

async fn export_metrics(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" })))
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "unknown panic".to_string()
    };
    ServiceError::Internal(format!("handler panicked: {detail}")).into_response()
}
