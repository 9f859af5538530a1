//! Multi-view synthesis through the Gemini `generateContent` endpoint.
//!
//! Views are requested one after another. Each request carries the prompt,
//! the source image and every view generated so far, so later views stay
//! consistent with earlier ones.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::GeminiConfig;
use crate::error::{Banana3dError, Result};
use crate::imaging;
use crate::views::{View, ViewStore};

const SERVICE: &str = "Gemini";
const GEMINI_API_VERSION: &str = "v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

/// Outcome of one synthesis run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewsReport {
    pub generated: Vec<View>,
    pub missing: Vec<View>,
}

impl ViewsReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(alias = "inline_data", rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout");
                Client::new()
            });
        Self { client, config }
    }

    fn url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let model = self.config.model.trim().trim_start_matches("models/");
        format!("{base}/{GEMINI_API_VERSION}/models/{model}:generateContent")
    }

    fn request_body(&self, prompt: &str, source: &[u8], context: &[Vec<u8>]) -> Value {
        let mut parts = vec![json!({ "text": prompt }), inline_png(source)];
        parts.extend(context.iter().map(|img| inline_png(img)));

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": self.config.temperature,
                "topK": self.config.top_k,
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    /// Request a single view. `Ok(None)` means the model answered without
    /// any image data.
    pub async fn generate_view(
        &self,
        prompt: &str,
        source: &[u8],
        context: &[Vec<u8>],
    ) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .post(self.url())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header("x-goog-api-key", &self.config.api_key)
            .json(&self.request_body(prompt, source, context))
            .send()
            .await
            .map_err(|source| Banana3dError::Http { service: SERVICE, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Banana3dError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            Banana3dError::UnexpectedResponse {
                service: SERVICE,
                reason: format!("invalid generation JSON: {e}"),
            }
        })?;

        let data = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.inline_data))
            .map(|d| d.data);

        match data {
            Some(b64) => Ok(Some(imaging::decode_base64(&b64)?)),
            None => Ok(None),
        }
    }

    /// Generate front, back and left views from `source` (PNG) and store them.
    pub async fn generate_character_views(
        &self,
        source: &[u8],
        store: &ViewStore,
    ) -> Result<ViewsReport> {
        let mut context: Vec<Vec<u8>> = Vec::with_capacity(View::ALL.len());
        let mut report = ViewsReport::default();

        for view in View::ALL {
            info!(view = %view, context = context.len(), "Generating view");
            match self.generate_view(view.prompt(), source, &context).await? {
                Some(bytes) => {
                    // Undecodable model output is reported as an upstream error.
                    let png = imaging::to_png(&bytes).map_err(|e| Banana3dError::UnexpectedResponse {
                        service: SERVICE,
                        reason: format!("{view} view: {e}"),
                    })?;
                    store.save_view(view, &png)?;
                    context.push(png);
                    report.generated.push(view);
                }
                None => {
                    warn!(view = %view, "No image data received");
                    report.missing.push(view);
                }
            }
        }

        info!(
            generated = report.generated.len(),
            missing = report.missing.len(),
            "View generation finished"
        );
        Ok(report)
    }
}

fn inline_png(png: &[u8]) -> Value {
    json!({
        "inlineData": {
            "mimeType": "image/png",
            "data": imaging::encode_base64(png),
        }
    })
}
