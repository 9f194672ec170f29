//! Replay runtime: serves forward passes from a raw-output dump.
//!
//! The GPU side of the pipeline exports, per evaluation run, a single JSON dump holding the
//! freshly constructed model's `state_dict` plus one raw-output record per image (proposals,
//! class probabilities, regression deltas and the input geometry its data loader used). Replaying
//! that dump keeps the whole driver — including the checkpoint filter/overlay/load sequence —
//! byte-for-byte deterministic and runnable without the tensor runtime installed.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{ForwardOutput, ModelRuntime, ParamMap, RuntimeError};

/// On-disk format of a raw-output dump.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayDump {
    /// The fresh model's parameter map, before any checkpoint is applied.
    pub state_dict: ParamMap,
    /// One record per image of the evaluation split, in split order.
    pub records: Vec<ForwardOutput>,
}

/// A [`ModelRuntime`] backed by a [`ReplayDump`] file.
pub struct ReplayRuntime {
    params: ParamMap,
    records: Vec<ForwardOutput>,
}

impl ReplayRuntime {
    /// Opens a dump file written by the export side of the training toolkit.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_impl(path.as_ref())
    }

    fn open_impl(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open raw-output dump `{}`", path.display()))?;
        let dump: ReplayDump = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("malformed raw-output dump `{}`", path.display()))?;
        log::debug!(
            "replaying {} raw-output records, {} model parameters",
            dump.records.len(),
            dump.state_dict.len()
        );
        Ok(Self::from_dump(dump))
    }

    /// Creates a runtime directly from an in-memory dump.
    pub fn from_dump(dump: ReplayDump) -> Self {
        Self {
            params: dump.state_dict,
            records: dump.records,
        }
    }

    /// Returns the number of per-image records in the dump.
    pub fn num_records(&self) -> usize {
        self.records.len()
    }
}

impl ModelRuntime for ReplayRuntime {
    fn state_dict(&self) -> &ParamMap {
        &self.params
    }

    fn load_state_dict(&mut self, params: ParamMap) -> Result<(), RuntimeError> {
        self.params = params;
        Ok(())
    }

    fn forward(&mut self, index: usize) -> Result<ForwardOutput, RuntimeError> {
        self.records
            .get(index)
            .cloned()
            .ok_or(RuntimeError::MissingRecord {
                index,
                count: self.records.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, ArrayD};

    use crate::nn::ImInfo;

    use super::*;

    fn dummy_record() -> ForwardOutput {
        ForwardOutput {
            rois: array![[0.0, 0.0, 1.0, 1.0]],
            scores: array![[0.1, 0.9]],
            deltas: array![[0.0, 0.0, 0.0, 0.0]],
            im_info: ImInfo {
                height: 100.0,
                width: 100.0,
                scale: 1.0,
            },
        }
    }

    #[test]
    fn forward_replays_records_in_order() {
        let mut runtime = ReplayRuntime::from_dump(ReplayDump {
            state_dict: ParamMap::new(),
            records: vec![dummy_record()],
        });
        assert_eq!(runtime.num_records(), 1);
        assert!(runtime.forward(0).is_ok());
        assert!(matches!(
            runtime.forward(1),
            Err(RuntimeError::MissingRecord { index: 1, count: 1 })
        ));
    }

    #[test]
    fn load_state_dict_replaces_params() {
        let mut state = ParamMap::new();
        state.insert("RCNN_base.0.weight".into(), ArrayD::zeros(vec![2, 2]));
        let mut runtime = ReplayRuntime::from_dump(ReplayDump {
            state_dict: state,
            records: Vec::new(),
        });

        let mut new_state = runtime.state_dict().clone();
        new_state["RCNN_base.0.weight"].fill(1.0);
        runtime.load_state_dict(new_state).unwrap();
        assert_eq!(runtime.state_dict()["RCNN_base.0.weight"][[0, 0]], 1.0);
    }
}
