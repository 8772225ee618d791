//! Axum JSON API in front of the batch ingestion pipeline.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hris_adapters::{CsvSource, Window};
use hris_core::{BatchResult, IngestKind, MAX_ROWS};
use hris_ingest::{connect_from_config, IngestConfig, IngestError, Ingestor};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "hris-web";

pub const API_KEY_HEADER: &str = "x-api-key";

/// Uploads carry at most `MAX_ROWS` rows; leave generous room for wide rows.
const UPLOAD_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub api_key: String,
    pub app_name: String,
}

impl AppState {
    pub fn new(ingestor: Ingestor, api_key: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            ingestor: Arc::new(ingestor),
            api_key: api_key.into(),
            app_name: app_name.into(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/info", get(info_handler))
        .route("/ingestion/{kind}/csv", post(upload_handler))
        .route("/ingestion/{kind}/file/{name}", post(file_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/ingestion/ping", get(ping_handler));

    Router::new()
        .nest("/api/v1", public.merge(protected))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .with_state(state)
}

pub async fn serve(config: IngestConfig) -> anyhow::Result<()> {
    let ingestor = connect_from_config(&config).await?;
    let state = AppState::new(ingestor, config.api_key.clone(), config.app_name.clone());
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(
        bind = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        errors_dir = %config.errors_dir().display(),
        "serving ingestion API"
    );
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(IngestConfig::from_env()).await
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            error!(error = %err, "ingestion failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    match presented {
        Some(key) if key == state.api_key => next.run(request).await,
        _ => ApiError::new(StatusCode::UNAUTHORIZED, "missing or invalid API key").into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct WindowQuery {
    offset: Option<i64>,
    limit: Option<i64>,
}

impl WindowQuery {
    /// Every HTTP batch is a page, so results always report offset, limit and total.
    fn window(&self) -> Result<Window, IngestError> {
        Ok(Window::page(self.offset, self.limit)?)
    }
}

fn parse_kind(raw: &str) -> Result<IngestKind, ApiError> {
    raw.parse()
        .map_err(|detail: String| ApiError::new(StatusCode::NOT_FOUND, detail))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ping_handler() -> Json<Value> {
    Json(json!({ "msg": "ingestion ok" }))
}

async fn info_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "name": state.app_name,
        "version": env!("CARGO_PKG_VERSION"),
        "engine": state.ingestor.store().engine(),
        "max_rows": MAX_ROWS,
        "data_dir": state.ingestor.data_dir().display().to_string(),
    }))
}

async fn file_handler(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<BatchResult>, ApiError> {
    let kind = parse_kind(&kind)?;
    let window = query.window()?;
    let result = state.ingestor.ingest_file(kind, &name, Some(window)).await?;
    Ok(Json(result))
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<WindowQuery>,
    mut multipart: Multipart,
) -> Result<Json<BatchResult>, ApiError> {
    let kind = parse_kind(&kind)?;
    let window = query.window()?;

    let mut source = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let label = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::new(err.status(), err.body_text()))?;
        source = Some(CsvSource::upload(label, bytes.to_vec()));
        break;
    }
    let source = source.ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "multipart field `file` is required",
        )
    })?;

    let result = state.ingestor.ingest(kind, &source, Some(window)).await?;
    Ok(Json(result))
}
