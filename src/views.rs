// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Checkpoint store for the pipeline.
//!
//! ```text
//! <base>/source-images/source-image.png
//! <base>/generated-images/generated_front_view.png
//! <base>/generated-images/generated_back_view.png
//! <base>/generated-images/generated_left_view.png
//! ```
//!
//! Step 3 is gated purely on the three generated files existing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Banana3dError, Result};
use crate::imaging;

pub const SOURCE_DIR: &str = "source-images";
pub const GENERATED_DIR: &str = "generated-images";
pub const SOURCE_FILE: &str = "source-image.png";

/// One synthesized viewpoint. Declaration order is generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Front,
    Back,
    Left,
}

impl View {
    pub const ALL: [View; 3] = [View::Front, View::Back, View::Left];

    pub fn name(self) -> &'static str {
        match self {
            View::Front => "front",
            View::Back => "back",
            View::Left => "left",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            View::Front => "generated_front_view.png",
            View::Back => "generated_back_view.png",
            View::Left => "generated_left_view.png",
        }
    }

    /// Prompt sent to the image model. The first view is derived from the
    /// source alone; later views also see the views generated before them.
    pub fn prompt(self) -> &'static str {
        match self {
            View::Front => "Create front view of the character from the source image for 3D modeling. Ensure the character is centered and in a T-pose, on a plain white background.",
            View::Back => "Create back view of the character from the provided images for 3D modeling. Ensure the character is centered and in a T-pose, on a plain white background.",
            View::Left => "Create left view of the character from the provided images for 3D modeling. Ensure the character is centered and in a T-pose, on a plain white background.",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Paths of the three generated views, keyed by view.
pub type ViewPaths = BTreeMap<View, PathBuf>;

#[derive(Debug, Clone)]
pub struct ViewStore {
    source_dir: PathBuf,
    generated_dir: PathBuf,
}

impl ViewStore {
    /// Open the store under `base`, creating both directories.
    pub fn open(base: &Path) -> Result<Self> {
        let source_dir = base.join(SOURCE_DIR);
        let generated_dir = base.join(GENERATED_DIR);
        std::fs::create_dir_all(&source_dir)?;
        std::fs::create_dir_all(&generated_dir)?;
        debug!(source = ?source_dir, generated = ?generated_dir, "View store opened");
        Ok(Self { source_dir, generated_dir })
    }

    pub fn source_path(&self) -> PathBuf {
        self.source_dir.join(SOURCE_FILE)
    }

    pub fn view_path(&self, view: View) -> PathBuf {
        self.generated_dir.join(view.file_name())
    }

    pub fn view_paths(&self) -> ViewPaths {
        View::ALL.iter().map(|&v| (v, self.view_path(v))).collect()
    }

    pub fn save_source(&self, png: &[u8]) -> Result<PathBuf> {
        let path = self.source_path();
        std::fs::write(&path, png)?;
        info!(path = ?path, bytes = png.len(), "Source image saved");
        Ok(path)
    }

    pub fn save_view(&self, view: View, png: &[u8]) -> Result<PathBuf> {
        let path = self.view_path(view);
        std::fs::write(&path, png)?;
        info!(view = %view, path = ?path, bytes = png.len(), "View saved");
        Ok(path)
    }

    pub fn read_view(&self, view: View) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.view_path(view))?)
    }

    /// Remove previously generated views so a new run can't be mistaken for
    /// a finished one. Returns how many files were removed.
    pub fn clear_views(&self) -> Result<usize> {
        let mut removed = 0;
        for view in View::ALL {
            match std::fs::remove_file(self.view_path(view)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            debug!(removed, "Stale views cleared");
        }
        Ok(removed)
    }

    pub fn missing(&self) -> Vec<View> {
        View::ALL
            .into_iter()
            .filter(|&v| !self.view_path(v).is_file())
            .collect()
    }

    pub fn all_present(&self) -> bool {
        self.missing().is_empty()
    }

    /// Fail with [`Banana3dError::MissingViews`] unless all three views exist.
    pub fn require_all(&self) -> Result<ViewPaths> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(Banana3dError::MissingViews(
                missing.iter().map(|v| v.name().to_string()).collect(),
            ));
        }
        Ok(self.view_paths())
    }

    /// All three views as `data:` URLs, or `None` while any is missing.
    pub fn read_all_data_urls(&self) -> Result<Option<BTreeMap<String, String>>> {
        if !self.all_present() {
            return Ok(None);
        }
        let mut views = BTreeMap::new();
        for view in View::ALL {
            let bytes = self.read_view(view)?;
            views.insert(view.name().to_string(), imaging::to_data_url(&bytes));
        }
        Ok(Some(views))
    }
}
