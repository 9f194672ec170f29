//! Test-time driver for an FPN aerial object detector.
//!
//! The network itself (backbone, RPN, ROI pooling) is a pretrained artifact hosted by an external
//! tensor runtime; this crate owns everything around it: loading a checkpoint while dropping the
//! adversarial nuisance-head parameters, decoding raw network outputs into image-space boxes,
//! per-class non-maximum suppression, the cross-class detection budget, and handing the finished
//! detection table to the evaluation toolkit.
//!
//! The pipeline for each image is `decode → suppress → cap`, a pure, deterministic computation of
//! its inputs. Images are processed sequentially; the detection table is append-only.

use log::LevelFilter;

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod eval;
pub mod nn;
pub mod nuisance;
pub mod num;
pub mod timer;
pub mod vis;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
