//! The seam to the external model runtime.
//!
//! The FPN network itself — backbone, region proposal network, ROI pooling and the
//! classification/regression heads — is a pretrained artifact that lives in an external tensor
//! runtime. This module defines the minimal interface the evaluation driver needs from it: a
//! parameter map to merge checkpoints into, and a forward pass producing raw proposals, class
//! probabilities and regression deltas.

pub mod replay;

use indexmap::IndexMap;
use ndarray::{Array2, ArrayD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named parameter tensors of a model, in declaration order.
pub type ParamMap = IndexMap<String, ArrayD<f32>>;

/// Geometry of one network input image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImInfo {
    /// Height of the network input frame, in pixels.
    pub height: f32,
    /// Width of the network input frame, in pixels.
    pub width: f32,
    /// The factor the original image was resized by before entering the network.
    pub scale: f32,
}

/// Raw outputs of one forward pass, still in the network input frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardOutput {
    /// Region proposals, `N×4` corner coordinates.
    pub rois: Array2<f32>,
    /// Per-proposal class probabilities, `N×C` with class 0 being background.
    pub scores: Array2<f32>,
    /// Per-proposal regression deltas, `N×4` (class-agnostic) or `N×4C`.
    pub deltas: Array2<f32>,
    /// Geometry the runtime's data pipeline used for this image.
    pub im_info: ImInfo,
}

/// Errors reported by a [`ModelRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no raw-output record for image {index} (runtime holds {count})")]
    MissingRecord { index: usize, count: usize },

    #[error("forward pass failed: {0}")]
    Forward(String),
}

/// A model runtime hosting the pretrained detector.
///
/// Parameters must be loaded (via [`load_state_dict`][Self::load_state_dict]) before the first
/// [`forward`][Self::forward] call; nothing else depends on call order.
pub trait ModelRuntime {
    /// Returns the freshly constructed model's parameter map.
    ///
    /// These are the defaults a filtered checkpoint is overlaid onto: parameters absent from the
    /// checkpoint (such as the discarded nuisance heads) keep the values returned here.
    fn state_dict(&self) -> &ParamMap;

    /// Replaces the model's parameters with `params`.
    ///
    /// Callers are expected to produce `params` through
    /// [`Checkpoint::overlay`][crate::checkpoint::Checkpoint::overlay], which validates names
    /// and shapes against [`state_dict`][Self::state_dict].
    fn load_state_dict(&mut self, params: ParamMap) -> Result<(), RuntimeError>;

    /// Runs the network on image `index` of the evaluation split.
    fn forward(&mut self, index: usize) -> Result<ForwardOutput, RuntimeError>;
}
