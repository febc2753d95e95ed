use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use outpost_core::db::LibSqlRecordStore;
use outpost_core::models::{
    ChangeOutcome, ChangeRequest, PullRequest, PullResponse, Resolution, ResolveRequest,
    SyncMetadata,
};
use outpost_core::{SyncEngine, SyncRecord};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::{AllowedOrigins, AppConfig};
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, RateLimitMetricsSnapshot, SyncEndpoint};

pub type Engine = SyncEngine<LibSqlRecordStore>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    engine: Arc<Engine>,
    jwt_verifier: Arc<JwtVerifier>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
            jwt_verifier: Arc::new(JwtVerifier::new(&config)),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(&config)),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/changes", post(push_changes))
        .route("/pull", post(pull_changes))
        .route("/resolve-conflict", post(resolve_conflict))
        .route("/metadata", get(sync_metadata))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1/sync", sync_routes)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = origin.as_str(), "Ignoring unusable CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(AllowOrigin::list(values))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    server_timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        server_timestamp: state.engine.server_timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Unwrap a JSON body, reporting rejections in the API's error shape
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, AppError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => Err(
            AppError::payload_too_large("Request body exceeds the configured size limit"),
        ),
        Err(rejection) => Err(AppError::bad_request(rejection.body_text())),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    message: &'static str,
    sync_results: Vec<ChangeOutcome>,
    server_timestamp: i64,
}

async fn push_changes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PushResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(SyncEndpoint::Push, &user.user_id)
        .await?;

    let mut body = json_body(body)?;
    let changes = match body.get_mut("changes").map(Value::take) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(changes)) => changes,
        Some(_) => return Err(AppError::bad_request("Changes must be an array")),
    };
    if changes.len() > state.config.max_batch_size {
        return Err(AppError::payload_too_large(format!(
            "At most {} changes may be sent per request",
            state.config.max_batch_size
        )));
    }

    let requests = changes.into_iter().map(ChangeRequest::from_value).collect();
    let sync_results = state.engine.ingest(&user.user_id, requests).await;
    tracing::info!(
        endpoint = SyncEndpoint::Push.label(),
        user = user_fingerprint(&user.user_id),
        session = user.session_id.as_deref().unwrap_or("none"),
        changes = sync_results.len(),
        "Processed outbox batch"
    );

    Ok(Json(PushResponse {
        message: "Sync completed",
        sync_results,
        server_timestamp: state.engine.server_timestamp(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullEnvelope {
    message: &'static str,
    #[serde(flatten)]
    response: PullResponse,
}

async fn pull_changes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PullEnvelope>, AppError> {
    state
        .endpoint_rate_limiter
        .check(SyncEndpoint::Pull, &user.user_id)
        .await?;

    let request: PullRequest = serde_json::from_value(json_body(body)?)
        .map_err(|error| AppError::bad_request(format!("Invalid pull request: {error}")))?;
    let response = state.engine.pull(&user.user_id, &request).await?;
    tracing::info!(
        endpoint = SyncEndpoint::Pull.label(),
        user = user_fingerprint(&user.user_id),
        records = response.record_count(),
        cursor = response.cursor,
        "Served delta pull"
    );

    Ok(Json(PullEnvelope {
        message: "Delta sync data retrieved",
        response,
    }))
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    message: &'static str,
    resolution: Resolution,
    record: SyncRecord,
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ResolveResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(SyncEndpoint::Resolve, &user.user_id)
        .await?;

    let mut body = json_body(body)?;
    // Unknown resolutions get the dedicated message rather than a serde error
    let resolution = body
        .get("resolution")
        .and_then(Value::as_str)
        .map(Resolution::from_str)
        .transpose()?
        .ok_or_else(|| {
            AppError::bad_request("Resolution must be either \"client\" or \"server\"")
        })?;
    body["resolution"] = Value::from(resolution.as_str());
    let request: ResolveRequest = serde_json::from_value(body)
        .map_err(|error| AppError::bad_request(format!("Invalid resolution request: {error}")))?;

    let record = state.engine.resolve(&user.user_id, request).await?;
    tracing::info!(
        endpoint = SyncEndpoint::Resolve.label(),
        user = user_fingerprint(&user.user_id),
        resolution = resolution.as_str(),
        updated_at = record.updated_at,
        "Resolved conflict"
    );

    Ok(Json(ResolveResponse {
        message: "Conflict resolved",
        resolution,
        record,
    }))
}

#[derive(Debug, Serialize)]
struct MetadataResponse {
    message: &'static str,
    metadata: Vec<SyncMetadata>,
}

async fn sync_metadata(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<MetadataResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(SyncEndpoint::Pull, &user.user_id)
        .await?;

    let metadata = state.engine.metadata(&user.user_id).await?;
    Ok(Json(MetadataResponse {
        message: "Sync metadata retrieved",
        metadata,
    }))
}

pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
