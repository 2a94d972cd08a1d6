use crate::config::ServerConfig;
use crate::error::IngestError;
use crate::ingest::{FrameRecord, Ingestor};
use crate::stats::{StatsReport, StatsRegister};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::any::Any as PanicPayload;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub stats: Arc<StatsRegister>,
    pub service_name: String,
}

/// Successful upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub frame_number: u64,
    pub timestamp_received: DateTime<Utc>,
    pub image_size: usize,
    pub resolution: String,
}

impl From<FrameRecord> for UploadResponse {
    fn from(record: FrameRecord) -> Self {
        Self {
            status: "ok",
            frame_number: record.sequence_number,
            timestamp_received: record.received_at,
            image_size: record.byte_size,
            resolution: record.resolution(),
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let stats = state.stats.clone();

    let router = Router::new()
        .route("/", get(index))
        .route("/upload", post(upload))
        .route("/stats", get(stats_report))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    with_panic_boundary(router, stats)
}

/// Turn a handler panic into a counted `InternalError` response.
fn with_panic_boundary(router: Router, stats: Arc<StatsRegister>) -> Router {
    router.layer(CatchPanicLayer::custom(
        move |panic: Box<dyn PanicPayload + Send + 'static>| -> Response {
            let detail = panic
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "handler panicked".to_string());

            stats.increment_errors();
            metrics::counter!("receiver.frames.failed", "kind" => "internal_error").increment(1);
            error!(error = %detail, "Request handler panicked");

            IngestError::InternalError(detail).into_response()
        },
    ))
}

/// Receive one frame from the device.
///
/// The body is taken as raw bytes so that every malformed payload, whatever
/// its content type or size, goes through the same counted rejection path.
async fn upload(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UploadResponse>, IngestError> {
    let body = body.map_err(|rejection| {
        let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            IngestError::PayloadTooLarge(rejection.body_text())
        } else {
            IngestError::MalformedRequest(rejection.body_text())
        };
        state.ingestor.reject(err)
    })?;

    let record = state.ingestor.ingest(&body).await?;
    Ok(Json(record.into()))
}

async fn stats_report(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.stats.snapshot().report())
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let snap = state.stats.snapshot();

    Html(format!(
        r#"<html>
<head><title>{name}</title></head>
<body>
    <h1>{name}</h1>
    <h2>Endpoints</h2>
    <ul>
        <li><b>POST /upload</b> - receive a frame from the camera</li>
        <li><b>GET /stats</b> - ingestion statistics</li>
        <li><b>GET /health</b> - health check</li>
    </ul>
    <h2>Current state</h2>
    <p>Frames received: {received}</p>
    <p>Errors: {errors}</p>
    <p>Uptime: {uptime} s</p>
    <p><a href="/stats">Full statistics (JSON)</a></p>
</body>
</html>
"#,
        name = state.service_name,
        received = snap.total_received,
        errors = snap.total_errors,
        uptime = snap.uptime_seconds(),
    ))
}

/// Start the HTTP server and serve until the future is dropped
pub async fn start_api_server(state: AppState, config: &ServerConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = config.listen_addr();

    info!(address = %addr, "Starting frame receiver API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
