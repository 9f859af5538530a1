use serde::Deserialize;
use std::path::PathBuf;
use crate::error::{Banana3dError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Where uploads and generated views are checkpointed.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Multi-view synthesis (Gemini image generation).
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// Mesh reconstruction (fal.ai queue).
    #[serde(default)]
    pub fal: FalConfig,
}

/// HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body in megabytes.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 5500 }
fn default_max_upload_mb() -> usize { 20 }
const MAX_UPLOAD_MB_LIMIT: usize = 1024;

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base directory holding `source-images/` and `generated-images/`.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { base_path: default_base_path() }
    }
}

fn default_base_path() -> PathBuf { PathBuf::from(".") }

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    /// API key; falls back to `GEMINI_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Max choices for the model to pick from.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Per-request timeout.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_url(),
            model: default_gemini_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            timeout_secs: default_gemini_timeout(),
        }
    }
}

fn default_gemini_url() -> String { "https://generativelanguage.googleapis.com".into() }
fn default_gemini_model() -> String { "gemini-2.5-flash-image-preview".into() }
fn default_temperature() -> f32 { 0.7 }
fn default_top_k() -> u32 { 1 }
fn default_gemini_timeout() -> u64 { 120 }

#[derive(Debug, Deserialize, Clone)]
pub struct FalConfig {
    /// API key; falls back to `FAL_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// Queue endpoint that jobs are submitted to.
    #[serde(default = "default_fal_queue_url")]
    pub queue_url: String,
    /// REST endpoint hosting the file storage API.
    #[serde(default = "default_fal_storage_url")]
    pub storage_url: String,
    #[serde(default = "default_fal_app")]
    pub app_id: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_octree_resolution")]
    pub octree_resolution: u32,
    #[serde(default = "default_textured_mesh")]
    pub textured_mesh: bool,
    /// Delay between queue status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound on the whole reconstruction job.
    #[serde(default = "default_fal_timeout")]
    pub timeout_secs: u64,
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            queue_url: default_fal_queue_url(),
            storage_url: default_fal_storage_url(),
            app_id: default_fal_app(),
            seed: default_seed(),
            num_inference_steps: default_inference_steps(),
            guidance_scale: default_guidance_scale(),
            octree_resolution: default_octree_resolution(),
            textured_mesh: default_textured_mesh(),
            poll_interval_ms: default_poll_interval(),
            timeout_secs: default_fal_timeout(),
        }
    }
}

fn default_fal_queue_url() -> String { "https://queue.fal.run".into() }
fn default_fal_storage_url() -> String { "https://rest.alpha.fal.ai".into() }
fn default_fal_app() -> String { "fal-ai/hunyuan3d/v2/multi-view".into() }
fn default_seed() -> u64 { 17880 }
fn default_inference_steps() -> u32 { 50 }
fn default_guidance_scale() -> f32 { 7.5 }
fn default_octree_resolution() -> u32 { 256 }
fn default_textured_mesh() -> bool { true }
fn default_poll_interval() -> u64 { 1000 }
fn default_fal_timeout() -> u64 { 600 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Banana3dError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text, then apply env overrides.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| Banana3dError::Config(format!("Invalid TOML: {e}")))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus env-provided API keys, for running without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Secrets left empty in the file are taken from the environment.
    pub fn apply_env(&mut self) {
        if self.gemini.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                self.gemini.api_key = key;
            }
        }
        if self.fal.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("FAL_KEY") {
                self.fal.api_key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Banana3dError::Config("server.port must be > 0".into()));
        }
        if self.server.max_upload_mb == 0 || self.server.max_upload_mb > MAX_UPLOAD_MB_LIMIT {
            return Err(Banana3dError::Config(format!(
                "server.max_upload_mb must be within 1..={MAX_UPLOAD_MB_LIMIT}"
            )));
        }
        if !(0.0..=2.0).contains(&self.gemini.temperature) {
            return Err(Banana3dError::Config("gemini.temperature must be within 0..=2".into()));
        }
        if self.gemini.top_k == 0 {
            return Err(Banana3dError::Config("gemini.top_k must be > 0".into()));
        }
        if self.fal.num_inference_steps == 0 {
            return Err(Banana3dError::Config("fal.num_inference_steps must be > 0".into()));
        }
        if self.fal.octree_resolution == 0 {
            return Err(Banana3dError::Config("fal.octree_resolution must be > 0".into()));
        }
        if self.fal.poll_interval_ms == 0 {
            return Err(Banana3dError::Config("fal.poll_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}
