//! HTTP surface: upload a photo, download the report.
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `POST /upload` | multipart field `image`; runs the pipeline; JSON `{success, pdfUrl \| message}` |
//! | `GET /download` | report named by the `report_id` cookie; single use |
//! | `GET /download/:id` | same, by explicit request id |
//! | `GET /health` | liveness |
//!
//! Pipeline failures are answered with `200` and `success: false`, exactly
//! like successes; only protocol problems (no identity, no image, unknown
//! report) use error status codes.

use crate::auth::{RequireUser, TokenVerifier};
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::orchestrate::Pipeline;
use crate::output::UploadResponse;
use crate::storage::ReportStore;
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Multipart field carrying the photo.
pub const IMAGE_FIELD: &str = "image";
/// Cookie binding a browser to the report its last upload produced.
pub const REPORT_COOKIE: &str = "report_id";

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub verifier: Arc<TokenVerifier>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(config: ServiceConfig, pipeline: Pipeline) -> Self {
        Self {
            verifier: Arc::new(TokenVerifier::new(&config.jwt_secret)),
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}

/// Errors answered before or after the pipeline runs.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image uploaded.")]
    MissingImage,

    #[error("Invalid upload: {detail}")]
    BadMultipart { status: StatusCode, detail: String },

    #[error("Report not found.")]
    ReportNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingImage => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::BadMultipart { status, .. } => (*status, self.to_string()),
            Self::ReportNotFound => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Internal(_) => {
                error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred.".to_string(),
                )
            }
        };
        (status, Json(UploadResponse::failure(message))).into_response()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/upload", post(upload))
        .route("/download", get(download))
        .route("/download/:id", get(download_by_id))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Open storage, resolve the provider, bind and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> Result<(), ServiceError> {
    let ttl = (config.report_ttl_secs > 0).then(|| Duration::from_secs(config.report_ttl_secs));
    let store = ReportStore::new(config.storage_dir.clone())
        .await?
        .with_report_ttl(ttl);
    info!("Storage initialized at {}", store.root().display());
    let pipeline = Pipeline::from_config(&config, store)?;

    let addr = config.bind_addr.clone();
    let app = router(AppState::new(config, pipeline));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServiceError::Bind {
            addr: addr.clone(),
            source: e,
        })?;

    info!("facereport listening on {}", addr);
    info!("  - POST /upload");
    info!("  - GET  /download");
    info!("  - GET  /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServiceError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn upload(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let bytes = read_image_field(multipart).await?;

    let slot = match state.pipeline.store().create_upload(&bytes).await {
        Ok(slot) => slot,
        Err(e) => {
            error!("{}", e);
            return Ok(Json(UploadResponse::from(&e)).into_response());
        }
    };

    // Detached so a dropped connection cannot interrupt the stages or the cleanup.
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = tokio::spawn(async move { pipeline.process_upload(&identity, slot).await })
        .await
        .map_err(|e| ApiError::Internal(format!("pipeline task failed: {e}")))?;

    if outcome.is_success() {
        // The cookie names one report, so the one it named before is unreachable now.
        if let Some(previous) = cookies
            .get(REPORT_COOKIE)
            .and_then(|c| c.value().parse::<Uuid>().ok())
            .filter(|prev| *prev != outcome.request_id)
        {
            state.pipeline.store().discard_report(previous).await;
        }
        cookies.add(
            Cookie::build((REPORT_COOKIE, outcome.request_id.to_string()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build(),
        );
    }
    Ok(Json(outcome.response()).into_response())
}

async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::BadMultipart {
        status: e.status(),
        detail: e.body_text(),
    };
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        if field.name() == Some(IMAGE_FIELD) {
            let data = field.bytes().await.map_err(bad)?;
            if data.is_empty() {
                return Err(ApiError::MissingImage);
            }
            return Ok(data.to_vec());
        }
    }
    Err(ApiError::MissingImage)
}

async fn download(State(state): State<AppState>, cookies: Cookies) -> Result<Response, ApiError> {
    let id = cookies
        .get(REPORT_COOKIE)
        .and_then(|c| c.value().parse::<Uuid>().ok())
        .ok_or(ApiError::ReportNotFound)?;

    let response = send_report(&state, id).await;
    // The report is single use either way, so the cookie goes too.
    let mut gone = Cookie::new(REPORT_COOKIE, "");
    gone.set_path("/");
    cookies.remove(gone);
    response
}

async fn download_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    send_report(&state, id).await
}

async fn send_report(state: &AppState, id: Uuid) -> Result<Response, ApiError> {
    let bytes = state
        .pipeline
        .store()
        .take_report(id)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read report {id}: {e}")))?
        .ok_or(ApiError::ReportNotFound)?;

    info!("Report {} downloaded ({} bytes)", id, bytes.len());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", state.config.report_filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {e}")))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
