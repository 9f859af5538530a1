//! HTTP API.
//!
//! Endpoints:
//!   POST /generate-views    (multipart `source_image`) → synthesize views
//!   GET  /generated-views                              → 202 pending / 200 data URLs
//!   GET  /generate-model                               → 424 until views exist, then mesh URL
//!   GET  /status                                       → pipeline status (JSON)

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::error::{Banana3dError, Result};
use crate::pipeline::{SharedPipeline, ViewsState};
use crate::views::View;

const UPLOAD_FIELD: &str = "source_image";

/// Shared state passed to all handlers.
pub struct AppState {
    pub pipeline: SharedPipeline,
}

// ──────────────── response types ──────────────────────────────────────────

#[derive(Serialize)]
struct GenerateViewsResponse {
    message: &'static str,
    generated: Vec<View>,
    missing: Vec<View>,
}

#[derive(Serialize)]
struct CompleteViewsResponse {
    status: &'static str,
    views: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ModelResponse {
    model_url: String,
}

// ──────────────── router ──────────────────────────────────────────────────

/// Build the axum router.
pub fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/generate-views", post(handle_generate_views))
        .route("/generated-views", get(handle_generated_views))
        .route("/generate-model", get(handle_generate_model))
        .route("/status", get(handle_status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until `shutdown` resolves.
pub async fn start_server(
    state: Arc<AppState>,
    bind: &str,
    port: u16,
    max_upload_bytes: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state, max_upload_bytes);
    let addr = format!("{bind}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(port, "HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn error_response(err: Banana3dError) -> Response {
    match err {
        Banana3dError::MissingViews(_) => (
            StatusCode::FAILED_DEPENDENCY,
            Json(json!({ "status": "pending", "message": "Generate views first." })),
        )
            .into_response(),
        Banana3dError::InvalidImage(_) => error_body(StatusCode::BAD_REQUEST, err.to_string()),
        Banana3dError::Busy => error_body(StatusCode::CONFLICT, err.to_string()),
        other => error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

// ──────────────── handlers ────────────────────────────────────────────────

async fn read_upload(multipart: &mut Multipart) -> std::result::Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            return field.bytes().await.map(Some);
        }
    }
    Ok(None)
}

async fn handle_generate_views(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Rejected non-multipart upload");
            return error_body(StatusCode::BAD_REQUEST, "No image part in the request");
        }
    };

    let upload = match read_upload(&mut multipart).await {
        Ok(Some(bytes)) if !bytes.is_empty() => bytes,
        Ok(Some(_)) => {
            return error_body(StatusCode::BAD_REQUEST, "No image selected for uploading");
        }
        Ok(None) => return error_body(StatusCode::BAD_REQUEST, "No image part in the request"),
        // Keeps 413 when the body limit is hit mid-stream.
        Err(e) => {
            warn!(error = %e, "Upload rejected");
            return error_body(e.status(), e.body_text());
        }
    };

    info!(bytes = upload.len(), "Source image received");

    match state.pipeline.generate_views(&upload).await {
        Ok(report) => (
            StatusCode::OK,
            Json(GenerateViewsResponse {
                message: "Successfully generated character views.",
                generated: report.generated,
                missing: report.missing,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "generate-views failed");
            error_response(e)
        }
    }
}

async fn handle_generated_views(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.generated_views() {
        Ok(ViewsState::Pending) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "pending", "message": "Generation in progress..." })),
        )
            .into_response(),
        Ok(ViewsState::Complete(views)) => {
            info!("All views found and readable, sending to client");
            (
                StatusCode::OK,
                Json(CompleteViewsResponse { status: "complete", views }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn handle_generate_model(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.generate_model().await {
        Ok(model_url) => (StatusCode::OK, Json(ModelResponse { model_url })).into_response(),
        Err(e) => {
            if !matches!(e, Banana3dError::MissingViews(_)) {
                error!(error = %e, "generate-model failed");
            }
            error_response(e)
        }
    }
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(state.pipeline.status())).into_response()
}
