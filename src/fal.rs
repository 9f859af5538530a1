//! Mesh reconstruction through the fal.ai queue API.
//!
//! ```text
//! front.png ─┐
//! back.png  ─┼─ upload (concurrent) ─→ file URLs ─→ submit ─→ poll status ─→ result
//! left.png  ─┘                                                               │
//!                                                                 model_mesh.url (.glb)
//! ```

use std::path::Path;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FalConfig;
use crate::error::{Banana3dError, Result};
use crate::views::{View, ViewPaths};

const SERVICE: &str = "fal.ai";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct FalClient {
    client: Client,
    config: FalConfig,
}

#[derive(Serialize)]
struct InitiateUpload<'a> {
    file_name: &'a str,
    content_type: &'a str,
}

#[derive(Deserialize)]
struct InitiatedUpload {
    upload_url: String,
    file_url: String,
}

/// Arguments accepted by the multi-view reconstruction app.
#[derive(Debug, Serialize)]
pub struct MultiViewRequest {
    pub front_image_url: String,
    pub back_image_url: String,
    pub left_image_url: String,
    pub seed: u64,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub octree_resolution: u32,
    pub textured_mesh: bool,
}

#[derive(Debug, Deserialize)]
struct QueuedRequest {
    request_id: String,
    status_url: Option<String>,
    response_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct MultiViewResult {
    model_mesh: Option<MeshFile>,
}

#[derive(Debug, Deserialize)]
struct MeshFile {
    url: Option<String>,
}

impl FalClient {
    pub fn new(config: FalConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout");
                Client::new()
            });
        Self { client, config }
    }

    fn auth(&self) -> String {
        format!("Key {}", self.config.api_key)
    }

    /// Queue path prefix for status/result URLs: `owner/app` without any
    /// sub-path, e.g. `fal-ai/hunyuan3d` for `fal-ai/hunyuan3d/v2/multi-view`.
    fn app_root(&self) -> String {
        self.config
            .app_id
            .trim_matches('/')
            .split('/')
            .take(2)
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Banana3dError::Upstream {
            service: SERVICE,
            status: status.as_u16(),
            body,
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
        response.json().await.map_err(|e| Banana3dError::UnexpectedResponse {
            service: SERVICE,
            reason: format!("invalid {what} JSON: {e}"),
        })
    }

    /// Upload `bytes` to fal storage and return its public URL.
    pub async fn upload(&self, bytes: Vec<u8>, file_name: &str, content_type: &str) -> Result<String> {
        let url = format!(
            "{}/storage/upload/initiate",
            self.config.storage_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth())
            .json(&InitiateUpload { file_name, content_type })
            .send()
            .await
            .map_err(|source| Banana3dError::Http { service: SERVICE, source })?;
        let initiated: InitiatedUpload = Self::parse(Self::check(response).await?, "upload").await?;

        let response = self
            .client
            .put(&initiated.upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|source| Banana3dError::Http { service: SERVICE, source })?;
        Self::check(response).await?;

        debug!(file = file_name, url = initiated.file_url, "Uploaded to fal storage");
        Ok(initiated.file_url)
    }

    async fn upload_view(&self, paths: &ViewPaths, view: View) -> Result<String> {
        let path = paths
            .get(&view)
            .ok_or_else(|| Banana3dError::MissingViews(vec![view.name().to_string()]))?;
        let bytes = tokio::fs::read(path).await?;
        self.upload(bytes, &file_name(path), "image/png").await
    }

    /// Submit a job and wait for its result. Returns the mesh URL.
    pub async fn run_multi_view(&self, request: &MultiViewRequest) -> Result<String> {
        let submit_url = format!(
            "{}/{}",
            self.config.queue_url.trim_end_matches('/'),
            self.config.app_id.trim_matches('/')
        );
        let response = self
            .client
            .post(submit_url)
            .header(AUTHORIZATION, self.auth())
            .json(request)
            .send()
            .await
            .map_err(|source| Banana3dError::Http { service: SERVICE, source })?;
        let queued: QueuedRequest = Self::parse(Self::check(response).await?, "submit").await?;
        info!(request_id = queued.request_id, "Reconstruction job queued");

        let requests_base = format!(
            "{}/{}/requests/{}",
            self.config.queue_url.trim_end_matches('/'),
            self.app_root(),
            queued.request_id
        );
        let status_url = queued
            .status_url
            .unwrap_or_else(|| format!("{requests_base}/status"));
        let response_url = queued.response_url.unwrap_or(requests_base);

        self.wait_for_completion(&queued.request_id, &status_url).await?;

        let response = self
            .client
            .get(&response_url)
            .header(AUTHORIZATION, self.auth())
            .send()
            .await
            .map_err(|source| Banana3dError::Http { service: SERVICE, source })?;
        let result: MultiViewResult = Self::parse(Self::check(response).await?, "result").await?;

        result
            .model_mesh
            .and_then(|m| m.url)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Banana3dError::UnexpectedResponse {
                service: SERVICE,
                reason: "result has no model_mesh.url".into(),
            })
    }

    async fn wait_for_completion(&self, request_id: &str, status_url: &str) -> Result<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let mut last = String::new();

        loop {
            let response = self
                .client
                .get(status_url)
                .header(AUTHORIZATION, self.auth())
                .send()
                .await
                .map_err(|source| Banana3dError::Http { service: SERVICE, source })?;
            let status: QueueStatus = Self::parse(Self::check(response).await?, "status").await?;

            if status.status != last {
                debug!(request_id, status = status.status, "Queue status");
                last = status.status.clone();
            }

            match status.status.as_str() {
                "COMPLETED" => return Ok(()),
                "IN_QUEUE" | "IN_PROGRESS" => {}
                other => {
                    return Err(Banana3dError::UnexpectedResponse {
                        service: SERVICE,
                        reason: format!("unknown queue status '{other}'"),
                    });
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Banana3dError::Timeout {
                    service: SERVICE,
                    secs: self.config.timeout_secs,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Upload the three views in parallel, run reconstruction, and return the
    /// URL of the textured `.glb` mesh.
    pub async fn generate_3d_model(&self, paths: &ViewPaths) -> Result<String> {
        info!("Uploading view images to fal storage");
        let (front, back, left) = tokio::try_join!(
            self.upload_view(paths, View::Front),
            self.upload_view(paths, View::Back),
            self.upload_view(paths, View::Left),
        )?;
        info!("View images uploaded");

        let request = MultiViewRequest {
            front_image_url: front,
            back_image_url: back,
            left_image_url: left,
            seed: self.config.seed,
            num_inference_steps: self.config.num_inference_steps,
            guidance_scale: self.config.guidance_scale,
            octree_resolution: self.config.octree_resolution,
            textured_mesh: self.config.textured_mesh,
        };

        let model_url = self.run_multi_view(&request).await?;
        info!(model_url, "3D model ready");
        Ok(model_url)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "view.png".into())
}
