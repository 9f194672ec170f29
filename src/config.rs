//! Test-time configuration.
//!
//! These are the knobs of the original evaluation config; none of them alter the logic of the
//! decode → suppress → cap pipeline, only its thresholds and constants.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detection::decode::DeltaNormalization;

/// Evaluation-time settings, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IoU overlap threshold for per-class non-maximum suppression.
    pub nms_thresh: f32,
    /// Score threshold for candidate selection; 0.0 keeps every positive-probability row.
    pub score_thresh: f32,
    /// Whether bounding-box regression deltas are applied at test time.
    pub bbox_reg: bool,
    /// Whether regression targets were standardized with precomputed statistics during training.
    pub bbox_normalize_targets_precomputed: bool,
    /// Per-coordinate target means, used when denormalizing deltas.
    pub bbox_normalize_means: [f32; 4],
    /// Per-coordinate target standard deviations, used when denormalizing deltas.
    pub bbox_normalize_stds: [f32; 4],
    /// Image-wide detection budget across all classes; 0 disables capping.
    pub max_per_image: usize,
    /// ROI pooling mode; overridden by checkpoints that record one.
    pub pooling_mode: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nms_thresh: 0.3,
            score_thresh: 0.0,
            bbox_reg: true,
            bbox_normalize_targets_precomputed: true,
            bbox_normalize_means: [0.0, 0.0, 0.0, 0.0],
            bbox_normalize_stds: [0.1, 0.1, 0.2, 0.2],
            max_per_image: 100,
            pooling_mode: "align".into(),
        }
    }
}

impl Config {
    /// Loads settings from a JSON file, with defaults for anything left unspecified.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config `{}`", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed config `{}`", path.display()))
    }

    /// The delta normalization to undo during decoding, if any.
    pub fn delta_normalization(&self) -> Option<DeltaNormalization> {
        self.bbox_normalize_targets_precomputed
            .then(|| DeltaNormalization {
                means: self.bbox_normalize_means,
                stds: self.bbox_normalize_stds,
            })
    }
}
