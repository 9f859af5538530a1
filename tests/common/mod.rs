//! Shared fixtures: a temp workspace and a wiremock server that plays both
//! Gemini and fal.ai.

#![allow(dead_code)]

use std::io::Cursor;

use banana3d::config::Config;
use banana3d::imaging;
use image::{ImageBuffer, ImageFormat, Rgb};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MODEL: &str = "test-image-model";
pub const MESH_URL: &str = "https://cdn.test/files/multiview_mesh.glb";

pub fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

pub fn encode(format: ImageFormat, rgb: [u8; 3]) -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 8, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode image");
    out.into_inner()
}

pub fn png(rgb: [u8; 3]) -> Vec<u8> {
    encode(ImageFormat::Png, rgb)
}

pub fn config_for(dir: &TempDir, server: &MockServer) -> Config {
    let mut cfg = Config::default();
    cfg.storage.base_path = dir.path().to_path_buf();
    cfg.gemini.api_key = "gemini-test-key".into();
    cfg.gemini.base_url = server.uri();
    cfg.gemini.model = MODEL.into();
    cfg.fal.api_key = "fal-test-key".into();
    cfg.fal.queue_url = server.uri();
    cfg.fal.storage_url = server.uri();
    cfg.fal.poll_interval_ms = 10;
    cfg.fal.timeout_secs = 5;
    cfg
}

pub fn gemini_path() -> String {
    format!("/v1beta/models/{MODEL}:generateContent")
}

pub fn gemini_image_response(png: &[u8]) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    { "text": "Here is the requested view." },
                    { "inlineData": { "mimeType": "image/png", "data": imaging::encode_base64(png) } }
                ]
            }
        }]
    })
}

pub async fn mount_gemini_image(server: &MockServer, png: &[u8]) {
    Mock::given(method("POST"))
        .and(path(gemini_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_image_response(png)))
        .mount(server)
        .await;
}

pub async fn mount_fal_uploads(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/storage/upload/initiate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "upload_url": format!("{}/upload/blob", server.uri()),
            "file_url": "https://cdn.test/files/view.png",
        })))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload/blob"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

pub async fn mount_fal_queue(server: &MockServer, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/fal-ai/hunyuan3d/v2/multi-view"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "request_id": "req-1",
            "status_url": format!("{}/fal-ai/hunyuan3d/requests/req-1/status", server.uri()),
            "response_url": format!("{}/fal-ai/hunyuan3d/requests/req-1", server.uri()),
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fal-ai/hunyuan3d/requests/req-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "COMPLETED" })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fal-ai/hunyuan3d/requests/req-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result))
        .mount(server)
        .await;
}

pub fn mesh_result() -> serde_json::Value {
    json!({
        "model_mesh": {
            "url": MESH_URL,
            "content_type": "application/octet-stream",
            "file_name": "multiview_mesh.glb",
            "file_size": 3726408
        },
        "seed": 17880
    })
}
