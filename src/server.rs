//! HTTP service exposing box-prompted cutouts
//!
//! `POST /segment-box` takes a multipart form with the image under `file` and
//! the box corners under `x1`, `y1`, `x2`, `y2`. The response body is the
//! cutout PNG; the same PNG is written to the upload directory.

use crate::{
    config::ServerConfig,
    error::{CutoutError, Result},
    service::SegmentationService,
    services::ImageIOService,
    tracing_config::spans,
    types::BoxPrompt,
};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument};

/// Response header telling whether the cutout was cropped
pub const OUTCOME_HEADER: HeaderName = HeaderName::from_static("x-boxcut-outcome");

/// Response header carrying the request correlation id
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    service: SegmentationService,
    upload_dir: PathBuf,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error rendered as `{"error": "..."}` with a matching status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CutoutError> for ApiError {
    fn from(err: CutoutError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else if err.is_upstream_error() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: format!("Malformed multipart body: {}", err.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Build the router with CORS, tracing and body-limit layers
///
/// # Errors
/// - An allowed origin is not a valid header value
pub fn build_router(service: SegmentationService, config: &ServerConfig) -> Result<Router> {
    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| CutoutError::invalid_config(format!("Invalid CORS origin: {origin}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .expose_headers([OUTCOME_HEADER, REQUEST_ID_HEADER]);

    let state = AppState {
        service,
        upload_dir: config.upload_dir.clone(),
    };

    Ok(Router::new()
        .route("/health", get(health_handler))
        .route("/segment-box", post(segment_box_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Serve until Ctrl+C or SIGTERM
///
/// # Errors
/// - Invalid configuration
/// - Bind or accept failures
pub async fn run_server(service: SegmentationService, config: ServerConfig) -> Result<()> {
    let app = build_router(service, &config)?;
    let addr = config.bind_address();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CutoutError::file_io_error("bind", &addr, &e))?;

    info!("Server listening on http://{addr}");
    info!("  GET  /health       - Health check");
    info!("  POST /segment-box  - Box-prompted cutout (multipart: file, x1, y1, x2, y2)");
    info!(upload_dir = %config.upload_dir.display(), "Cutouts are persisted");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.service.backend_name(),
    })
}

async fn segment_box_handler(State(state): State<AppState>, multipart: Multipart) -> Response {
    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let span = spans::request(&request_id);

    let mut response = match segment_box(state, multipart).instrument(span).await {
        Ok(response) => response,
        Err(err) => {
            if err.status.is_server_error() {
                error!(request_id = %request_id, status = %err.status, error = %err.message, "Cutout failed");
            } else {
                warn!(request_id = %request_id, status = %err.status, error = %err.message, "Cutout rejected");
            }
            err.into_response()
        },
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Upload fields collected from the multipart body
#[derive(Default)]
struct SegmentForm {
    file: Option<Vec<u8>>,
    x1: Option<i32>,
    y1: Option<i32>,
    x2: Option<i32>,
    y2: Option<i32>,
}

impl SegmentForm {
    async fn read(mut multipart: Multipart) -> std::result::Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => form.file = Some(field.bytes().await?.to_vec()),
                "x1" | "y1" | "x2" | "y2" => {
                    let text = field.text().await?;
                    let value = text.trim().parse::<i32>().map_err(|_| {
                        ApiError::bad_request(format!("Field '{name}' must be an integer, got '{text}'"))
                    })?;
                    match name.as_str() {
                        "x1" => form.x1 = Some(value),
                        "y1" => form.y1 = Some(value),
                        "x2" => form.x2 = Some(value),
                        _ => form.y2 = Some(value),
                    }
                },
                _ => {},
            }
        }

        Ok(form)
    }

    fn into_parts(self) -> std::result::Result<(Vec<u8>, BoxPrompt), ApiError> {
        let missing = |field: &str| ApiError::bad_request(format!("Missing form field '{field}'"));
        let file = self.file.ok_or_else(|| missing("file"))?;
        let prompt = BoxPrompt::new(
            self.x1.ok_or_else(|| missing("x1"))?,
            self.y1.ok_or_else(|| missing("y1"))?,
            self.x2.ok_or_else(|| missing("x2"))?,
            self.y2.ok_or_else(|| missing("y2"))?,
        );
        Ok((file, prompt))
    }
}

async fn segment_box(state: AppState, multipart: Multipart) -> std::result::Result<Response, ApiError> {
    let start = Instant::now();
    let (bytes, prompt) = SegmentForm::read(multipart).await?.into_parts()?;
    info!(bytes = bytes.len(), prompt = %prompt, "Processing cutout request");

    let image = {
        let span = spans::image_loading("upload", bytes.len());
        tokio::task::spawn_blocking(move || span.in_scope(|| ImageIOService::decode_upload(&bytes)))
            .await
            .map_err(|e| CutoutError::internal(format!("Decode task failed: {e}")))??
    };

    let result = state.service.cutout(image, prompt).await?;
    let png = result.to_png_bytes()?;

    let upload_dir = state.upload_dir.clone();
    let stored = png.clone();
    let path = tokio::task::spawn_blocking(move || ImageIOService::persist_png(upload_dir, &stored))
        .await
        .map_err(|e| CutoutError::internal(format!("Persist task failed: {e}")))??;

    info!(
        outcome = result.outcome.as_str(),
        width = result.image.width(),
        height = result.image.height(),
        path = %path.display(),
        total_ms = start.elapsed().as_millis() as u64,
        "Cutout served"
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (OUTCOME_HEADER, HeaderValue::from_static(result.outcome.as_str())),
        ],
        png,
    )
        .into_response())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
