// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Pipeline: upload → multi-view synthesis → mesh reconstruction.
//!
//! Owns the checkpoint store and both upstream clients. Steps are gated on
//! the files in the store, not on in-memory state; the [`PipelineStatus`]
//! snapshot is informational only.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Banana3dError, Result};
use crate::fal::FalClient;
use crate::gemini::{GeminiClient, ViewsReport};
use crate::imaging;
use crate::views::ViewStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    GeneratingViews,
    ViewsReady,
    GeneratingModel,
    ModelReady,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub stage: Stage,
    pub updated_at: DateTime<Utc>,
    pub views_present: bool,
    pub model_url: Option<String>,
    pub last_error: Option<String>,
}

/// Result of polling for generated views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewsState {
    Pending,
    /// view name → `data:image/png;base64,...`
    Complete(BTreeMap<String, String>),
}

pub struct Pipeline {
    store: ViewStore,
    gemini: GeminiClient,
    fal: FalClient,
    status: RwLock<PipelineStatus>,
    /// Held for the duration of a generation step.
    busy: Mutex<()>,
}

pub type SharedPipeline = Arc<Pipeline>;

impl Pipeline {
    /// Build the pipeline from a validated [`Config`].
    pub fn new(config: &Config) -> Result<Self> {
        let store = ViewStore::open(&config.storage.base_path)?;
        let stage = if store.all_present() { Stage::ViewsReady } else { Stage::Idle };
        info!(base_path = ?config.storage.base_path, stage = ?stage, "Pipeline ready");

        Ok(Self {
            status: RwLock::new(PipelineStatus {
                stage,
                updated_at: Utc::now(),
                views_present: store.all_present(),
                model_url: None,
                last_error: None,
            }),
            store,
            gemini: GeminiClient::new(config.gemini.clone()),
            fal: FalClient::new(config.fal.clone()),
            busy: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &ViewStore {
        &self.store
    }

    pub fn status(&self) -> PipelineStatus {
        let mut snapshot = self.status.read().clone();
        snapshot.views_present = self.store.all_present();
        snapshot
    }

    /// Stage and model URL change together under one lock.
    fn set_stage(&self, stage: Stage, model_url: Option<String>) {
        let mut s = self.status.write();
        s.stage = stage;
        s.model_url = model_url;
        s.updated_at = Utc::now();
        if stage != Stage::Failed {
            s.last_error = None;
        }
    }

    fn fail(&self, err: &Banana3dError) {
        let mut s = self.status.write();
        s.stage = Stage::Failed;
        s.updated_at = Utc::now();
        s.last_error = Some(err.to_string());
    }

    /// Step 2: store the uploaded image and synthesize the three views.
    pub async fn generate_views(&self, upload: &[u8]) -> Result<ViewsReport> {
        let _guard = self.busy.try_lock().map_err(|_| Banana3dError::Busy)?;

        let source = imaging::to_png(upload)?;
        self.store.save_source(&source)?;
        self.store.clear_views()?;
        self.set_stage(Stage::GeneratingViews, None);

        match self.gemini.generate_character_views(&source, &self.store).await {
            Ok(report) => {
                let stage = if report.is_complete() { Stage::ViewsReady } else { Stage::Idle };
                self.set_stage(stage, None);
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "View generation failed");
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Poll for the generated views.
    pub fn generated_views(&self) -> Result<ViewsState> {
        Ok(match self.store.read_all_data_urls()? {
            Some(views) => ViewsState::Complete(views),
            None => ViewsState::Pending,
        })
    }

    /// Step 3: reconstruct a mesh from the stored views.
    pub async fn generate_model(&self) -> Result<String> {
        let paths = self.store.require_all()?;
        let _guard = self.busy.try_lock().map_err(|_| Banana3dError::Busy)?;
        self.set_stage(Stage::GeneratingModel, None);

        match self.fal.generate_3d_model(&paths).await {
            Ok(url) => {
                self.set_stage(Stage::ModelReady, Some(url.clone()));
                Ok(url)
            }
            Err(e) => {
                error!(error = %e, "Model generation failed");
                self.fail(&e);
                Err(e)
            }
        }
    }
}
