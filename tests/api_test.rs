//! HTTP API tests against the router, using axum's test utilities.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use banana3d::api::{build_router, AppState};
use banana3d::pipeline::Pipeline;
use banana3d::views::View;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;

const BOUNDARY: &str = "banana3d-test-boundary";

fn app(dir: &TempDir, server: &MockServer) -> (Router, Arc<Pipeline>) {
    let pipeline = Arc::new(Pipeline::new(&config_for(dir, server)).expect("pipeline"));
    let state = Arc::new(AppState { pipeline: pipeline.clone() });
    (build_router(state, 10 * 1024 * 1024), pipeline)
}

fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"hero.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(field: &str, bytes: &[u8]) -> Request<Body> {
    Request::post("/generate-views")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, bytes)))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_generated_views_pending_until_all_exist() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    let (app, pipeline) = app(&dir, &server);

    let (status, body) = send(&app, get("/generated-views")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");

    pipeline.store().save_view(View::Front, &png([1, 1, 1])).unwrap();
    pipeline.store().save_view(View::Back, &png([1, 1, 1])).unwrap();
    let (status, _) = send(&app, get("/generated-views")).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    pipeline.store().save_view(View::Left, &png([1, 1, 1])).unwrap();
    let (status, body) = send(&app, get("/generated-views")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");
    for name in ["front", "back", "left"] {
        assert!(body["views"][name]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }
}

#[tokio::test]
async fn test_generate_model_without_views_is_424() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    let (app, _) = app(&dir, &server);

    let (status, body) = send(&app, get("/generate-model")).await;
    assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["message"], "Generate views first.");
}

#[tokio::test]
async fn test_upload_without_image_part_is_400() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    let (app, _) = app(&dir, &server);

    let (status, body) = send(&app, upload_request("avatar", &png([1, 2, 3]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image part in the request");

    let (status, body) = send(&app, upload_request("source_image", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image selected for uploading");

    let plain = Request::post("/generate-views")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, plain).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_that_is_not_an_image_is_400() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    let (app, _) = app(&dir, &server);

    let (status, body) = send(&app, upload_request("source_image", b"plain text")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image"));
}

#[tokio::test]
async fn test_full_flow_upload_poll_model() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    mount_gemini_image(&server, &png([0, 0, 255])).await;
    mount_fal_uploads(&server).await;
    mount_fal_queue(&server, mesh_result()).await;
    let (app, _) = app(&dir, &server);

    let (status, body) = send(&app, upload_request("source_image", &png([255, 0, 0]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Successfully generated character views.");
    assert_eq!(body["generated"], serde_json::json!(["front", "back", "left"]));

    let (status, body) = send(&app, get("/generated-views")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "complete");

    let (status, body) = send(&app, get("/generate-model")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_url"], MESH_URL);

    let (status, body) = send(&app, get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "model_ready");
    assert_eq!(body["views_present"], true);
    assert_eq!(body["model_url"], MESH_URL);
}

#[tokio::test]
async fn test_upstream_failure_is_500() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    mount_fal_uploads(&server).await;
    Mock::given(method("POST"))
        .and(path("/fal-ai/hunyuan3d/v2/multi-view"))
        .respond_with(ResponseTemplate::new(500).set_body_string("worker crashed"))
        .mount(&server)
        .await;
    let (app, pipeline) = app(&dir, &server);
    for view in View::ALL {
        pipeline.store().save_view(view, &png([4, 4, 4])).unwrap();
    }

    let (status, body) = send(&app, get("/generate-model")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("worker crashed"));

    let (_, body) = send(&app, get("/status")).await;
    assert_eq!(body["stage"], "failed");
}

#[tokio::test]
async fn test_new_upload_discards_previous_views() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    Mock::given(method("POST"))
        .and(path(gemini_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })))
        .mount(&server)
        .await;
    let (app, pipeline) = app(&dir, &server);
    for view in View::ALL {
        pipeline.store().save_view(view, &png([6, 6, 6])).unwrap();
    }

    let (status, body) = send(&app, upload_request("source_image", &png([1, 1, 1]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["missing"].as_array().unwrap().len(), 3);

    let (status, _) = send(&app, get("/generated-views")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    let pipeline = Arc::new(Pipeline::new(&config_for(&dir, &server)).expect("pipeline"));
    let app = build_router(Arc::new(AppState { pipeline }), 1024);

    let (status, body) = send(&app, upload_request("source_image", &vec![0xAB; 4096])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
    assert!(server.received_requests().await.expect("recorded").is_empty());
}

#[tokio::test]
async fn test_upload_while_generating_is_409() {
    let server = MockServer::start().await;
    let dir = tmp_dir();
    Mock::given(method("POST"))
        .and(path(gemini_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_image_response(&png([0, 9, 0])))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    let (app, pipeline) = app(&dir, &server);

    let running = tokio::spawn({
        let pipeline = pipeline.clone();
        let upload = png([9, 0, 0]);
        async move { pipeline.generate_views(&upload).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let (status, body) = send(&app, upload_request("source_image", &png([1, 2, 3]))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already running"));

    let report = running.await.expect("join").expect("first run");
    assert!(report.is_complete());

    let (status, _) = send(&app, get("/generated-views")).await;
    assert_eq!(status, StatusCode::OK);
}
