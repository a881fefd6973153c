//! HTTP front end (axum).
//!
//! | Route | Method | Body | Reply |
//! |-------|--------|------|-------|
//! | `/` | GET | | 307 to `/index` |
//! | `/index` | GET | | upload form (static HTML) |
//! | `/extraction` | POST | multipart `passport_img` | `{"extraction_output": PassportRecord}` |
//! | `/verification` | POST | multipart `passport_img`, `capture_img` | `{"verification_result": VerificationResult}` |
//! | `/health` | GET | | `OK` |
//!
//! Failures are rendered as `{"error": {"kind", "category", "message"}}`.

use crate::config::ServiceConfig;
use crate::error::{ErrorCategory, PassportError};
use crate::extract::PassportRecord;
use crate::pipeline::crop::image_dimensions;
use crate::pipeline::encode::{EmbeddableImage, DEFAULT_MIME};
use crate::service::PassportService;
use crate::verify::VerificationResult;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Multipart field holding the passport image.
pub const PASSPORT_FIELD: &str = "passport_img";
/// Multipart field holding the selfie.
pub const CAPTURE_FIELD: &str = "capture_img";

const INDEX_HTML: &str = include_str!("../templates/index.html");

#[derive(Clone)]
struct AppState {
    service: Arc<PassportService>,
}

#[derive(Debug, Serialize)]
struct ExtractionResponse {
    extraction_output: PassportRecord,
}

#[derive(Debug, Serialize)]
struct VerificationResponse {
    verification_result: VerificationResult,
}

/// A [`PassportError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: PassportError,
}

impl From<PassportError> for ApiError {
    fn from(error: PassportError) -> Self {
        Self {
            status: status_for(&error),
            error,
        }
    }
}

/// HTTP status for an error.
pub fn status_for(error: &PassportError) -> StatusCode {
    match (error, error.category()) {
        (PassportError::Timeout { .. }, _) => StatusCode::GATEWAY_TIMEOUT,
        (_, ErrorCategory::Upload) => StatusCode::BAD_REQUEST,
        (_, ErrorCategory::NoFace) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorCategory::Provider) => StatusCode::BAD_GATEWAY,
        (_, ErrorCategory::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("{} {}: {}", self.status, self.error.kind(), self.error);
        }
        let body = json!({
            "error": {
                "kind": self.error.kind(),
                "category": self.error.category(),
                "message": self.error.to_string(),
            }
        });
        (self.status, Json(body)).into_response()
    }
}

/// Build the router around an already constructed service.
pub fn router(service: Arc<PassportService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/index", get(index))
        .route("/health", get(health))
        .route("/extraction", post(extraction))
        .route("/verification", post(verification))
        .with_state(AppState { service })
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Build the service from `config`, bind `config.bind_addr` and serve until
/// Ctrl-C.
pub async fn serve(config: &ServiceConfig) -> Result<(), PassportError> {
    let service = Arc::new(PassportService::new(config)?);
    let app = router(service, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| {
            PassportError::InvalidConfig(format!("failed to bind {}: {e}", config.bind_addr))
        })?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| PassportError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn root() -> Redirect {
    Redirect::temporary("/index")
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> &'static str {
    "OK"
}

async fn extraction(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractionResponse>, ApiError> {
    let mut images = read_images(multipart, &[PASSPORT_FIELD]).await?;
    let passport = take_image(&mut images, PASSPORT_FIELD)?;
    let record = state.service.extract_passport_info(&passport).await?;
    Ok(Json(ExtractionResponse {
        extraction_output: record,
    }))
}

async fn verification(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<VerificationResponse>, ApiError> {
    let mut images = read_images(multipart, &[PASSPORT_FIELD, CAPTURE_FIELD]).await?;
    let passport = take_image(&mut images, PASSPORT_FIELD)?;
    let selfie = take_image(&mut images, CAPTURE_FIELD)?;
    let result = state.service.verify(&selfie, &passport).await?;
    Ok(Json(VerificationResponse {
        verification_result: result,
    }))
}

fn upload_error(field: &str, detail: impl Into<String>) -> PassportError {
    PassportError::Upload {
        field: field.to_string(),
        detail: detail.into(),
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    let mut err = ApiError::from(upload_error("multipart", e.body_text()));
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        err.status = status;
    }
    err
}

/// Collect the `wanted` file fields. Unknown fields are ignored.
///
/// A part without an `image/*` content type is treated as `image/jpeg`.
/// Every image must at least have a readable header.
async fn read_images(
    mut multipart: Multipart,
    wanted: &[&'static str],
) -> Result<HashMap<&'static str, EmbeddableImage>, ApiError> {
    let mut images = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = wanted.iter().copied().find(|w| field.name() == Some(*w)) else {
            continue;
        };
        let mime = field
            .content_type()
            .filter(|ct| ct.starts_with("image/"))
            .unwrap_or(DEFAULT_MIME)
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            return Err(upload_error(name, "file is empty").into());
        }
        image_dimensions(&bytes).map_err(|e| upload_error(name, e.to_string()))?;
        images.insert(name, EmbeddableImage::new(bytes.to_vec(), mime));
    }
    Ok(images)
}

fn take_image(
    images: &mut HashMap<&'static str, EmbeddableImage>,
    field: &'static str,
) -> Result<EmbeddableImage, ApiError> {
    images
        .remove(field)
        .ok_or_else(|| upload_error(field, "missing file field").into())
}
