//! Loading persisted checkpoints and filtering out the adversarial-head parameters.
//!
//! Checkpoints are written by the training toolkit and include the parameters of the auxiliary
//! nuisance heads (altitude, viewing angle, weather). Those heads are unused at test time, so
//! their parameters are stripped before the checkpoint is merged into a freshly constructed
//! model; the heads simply fall back to their default initialization.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nn::ParamMap;

/// Parameter-name fragments belonging to the adversarial nuisance heads.
pub const NUISANCE_HEAD_KEYS: [&str; 6] = [
    "RCNN_angle_score",
    "RCNN_altitude_score",
    "RCNN_weather_score",
    "RCNN_angle",
    "RCNN_weather",
    "RCNN_altitude",
];

/// Errors produced while loading or merging a checkpoint.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read checkpoint `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed checkpoint `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint parameter `{0}` does not exist in the model")]
    UnknownParam(String),

    #[error("checkpoint parameter `{name}` has shape {checkpoint:?}, the model expects {model:?}")]
    ShapeMismatch {
        name: String,
        checkpoint: Vec<usize>,
        model: Vec<usize>,
    },
}

/// A deserialized training checkpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The persisted parameter map.
    pub model: ParamMap,
    /// ROI pooling mode the model was trained with, if the checkpoint recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooling_mode: Option<String>,
}

impl Checkpoint {
    /// Loads a checkpoint from disk.
    ///
    /// A missing or unreadable file is fatal; callers abort before any inference begins.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| LoadError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Removes every parameter belonging to a nuisance-adversarial head.
    pub fn strip_nuisance_keys(&mut self) {
        self.model
            .retain(|name, _| !NUISANCE_HEAD_KEYS.iter().any(|frag| name.contains(frag)));
    }

    /// Overlays the (filtered) checkpoint onto the model's default parameter map.
    ///
    /// Keys present in both maps take the checkpoint's value; keys only in `defaults` keep their
    /// default — this is how the backbone keeps its pretrained weights while the stripped
    /// nuisance heads stay at their fresh initialization. A checkpoint key unknown to the model,
    /// or one whose shape disagrees with the model's, fails loudly rather than relying on the
    /// tensor engine to notice later.
    pub fn overlay(&self, defaults: &ParamMap) -> Result<ParamMap, LoadError> {
        let mut merged = defaults.clone();
        for (name, value) in &self.model {
            let slot = merged
                .get_mut(name)
                .ok_or_else(|| LoadError::UnknownParam(name.clone()))?;
            if slot.shape() != value.shape() {
                return Err(LoadError::ShapeMismatch {
                    name: name.clone(),
                    checkpoint: value.shape().to_vec(),
                    model: slot.shape().to_vec(),
                });
            }
            *slot = value.clone();
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::ArrayD;

    use super::*;

    fn param(shape: &[usize], value: f32) -> ArrayD<f32> {
        ArrayD::from_elem(shape.to_vec(), value)
    }

    fn checkpoint(entries: &[(&str, &[usize])]) -> Checkpoint {
        let mut model = ParamMap::new();
        for (name, shape) in entries {
            model.insert((*name).into(), param(shape, 1.0));
        }
        Checkpoint {
            model,
            pooling_mode: None,
        }
    }

    #[test]
    fn strip_removes_every_denylisted_key_and_nothing_else() {
        let mut ckpt = checkpoint(&[
            ("RCNN_angle_score.weight", &[2]),
            ("RCNN_altitude_score.bias", &[2]),
            ("RCNN_weather_score.weight", &[2]),
            ("RCNN_angle.fc.weight", &[2]),
            ("RCNN_weather.fc.weight", &[2]),
            ("RCNN_altitude.fc.weight", &[2]),
            ("RCNN_base.0.weight", &[2]),
            ("RCNN_cls_score.weight", &[2]),
            ("RCNN_bbox_pred.bias", &[2]),
        ]);
        ckpt.strip_nuisance_keys();

        let keys: Vec<_> = ckpt.model.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "RCNN_base.0.weight",
                "RCNN_cls_score.weight",
                "RCNN_bbox_pred.bias",
            ]
        );
    }

    #[test]
    fn overlay_replaces_loaded_keys_and_keeps_defaults() {
        let mut defaults = ParamMap::new();
        defaults.insert("RCNN_base.0.weight".into(), param(&[2, 2], 0.0));
        defaults.insert("RCNN_angle.fc.weight".into(), param(&[4], 0.5));

        let ckpt = checkpoint(&[("RCNN_base.0.weight", &[2, 2])]);
        let merged = ckpt.overlay(&defaults).unwrap();

        assert_eq!(merged["RCNN_base.0.weight"][[0, 0]], 1.0);
        // Not in the checkpoint: keeps its fresh initialization.
        assert_eq!(merged["RCNN_angle.fc.weight"][[0]], 0.5);
    }

    #[test]
    fn overlay_rejects_unknown_params() {
        let defaults = ParamMap::new();
        let ckpt = checkpoint(&[("RCNN_top.weight", &[2])]);
        assert!(matches!(
            ckpt.overlay(&defaults),
            Err(LoadError::UnknownParam(name)) if name == "RCNN_top.weight"
        ));
    }

    #[test]
    fn overlay_rejects_shape_mismatches() {
        let mut defaults = ParamMap::new();
        defaults.insert("RCNN_base.0.weight".into(), param(&[2, 2], 0.0));
        let ckpt = checkpoint(&[("RCNN_base.0.weight", &[3, 3])]);
        assert!(matches!(
            ckpt.overlay(&defaults),
            Err(LoadError::ShapeMismatch { .. })
        ));
    }
}
