//! Dataset registry and loaders.
//!
//! Datasets are registered under `<name>_<year>_<split>` keys, each mapping to a deferred
//! constructor; nothing is touched on disk until [`get_dataset`] resolves a name. The registry is
//! built once at startup and is read-only afterwards.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::detection::DetectionTable;

/// A dataset usable for evaluation.
pub trait Dataset: std::fmt::Debug {
    /// The registered dataset name, e.g. `uav_2017_test`.
    fn name(&self) -> &str;

    /// Class names; index 0 is the background class and never holds detections.
    fn classes(&self) -> &[&'static str];

    fn num_images(&self) -> usize;

    /// The dataset-internal id of image `index`.
    fn image_id_at(&self, index: usize) -> &str;

    /// Filesystem path of image `index`.
    fn image_path_at(&self, index: usize) -> PathBuf;

    /// Hands a finished detection table to the evaluation toolkit.
    ///
    /// Writes per-class result files partitioned by nuisance type under `output_dir`; the metric
    /// computation itself (mean average precision at `ovthresh`) is carried out by the external
    /// toolkit that consumes these files.
    fn evaluate_detections(
        &self,
        table: &DetectionTable,
        output_dir: &Path,
        nuisance_type: &str,
        baseline_method: bool,
        ovthresh: f32,
    ) -> Result<()>;
}

/// A dataset name that is not in the registry.
#[derive(Debug, Error)]
#[error("unknown dataset: {0}")]
pub struct LookupError(pub String);

type Factory = Box<dyn Fn() -> Result<Box<dyn Dataset>> + Send + Sync>;

static REGISTRY: Lazy<BTreeMap<String, Factory>> = Lazy::new(|| {
    let mut sets: BTreeMap<String, Factory> = BTreeMap::new();

    for split in ["trainval", "test", "trainvaltest"] {
        sets.insert(
            format!("uav_2017_{split}"),
            Box::new(move || {
                let ds = ImageSetDataset::open(
                    format!("uav_2017_{split}"),
                    "uav2017",
                    split,
                    UAV_CLASSES,
                )?;
                Ok(Box::new(ds) as Box<dyn Dataset>)
            }),
        );
    }

    for split in ["trainval", "test"] {
        sets.insert(
            format!("visdrone_2017_{split}"),
            Box::new(move || {
                let ds = ImageSetDataset::open(
                    format!("visdrone_2017_{split}"),
                    "visdrone2017",
                    split,
                    VISDRONE_CLASSES,
                )?;
                Ok(Box::new(ds) as Box<dyn Dataset>)
            }),
        );
    }

    sets
});

/// Resolves a dataset by its registered name.
pub fn get_dataset(name: &str) -> Result<Box<dyn Dataset>> {
    let factory = REGISTRY
        .get(name)
        .ok_or_else(|| LookupError(name.to_owned()))?;
    factory()
}

/// Lists all registered dataset names.
pub fn list_datasets() -> Vec<String> {
    REGISTRY.keys().cloned().collect()
}

const UAV_CLASSES: &[&str] = &["__background__", "car", "truck", "bus"];

const VISDRONE_CLASSES: &[&str] = &[
    "__background__",
    "pedestrian",
    "people",
    "bicycle",
    "car",
    "van",
    "truck",
    "tricycle",
    "awning-tricycle",
    "bus",
    "motor",
];

fn data_root() -> PathBuf {
    std::env::var_os("UAVDET_DATA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// A dataset backed by an image-set split file under the data root.
///
/// Expected layout: `<root>/ImageSets/<split>.txt` listing one image id per line, with the
/// images themselves at `<root>/Images/<id>.jpg`.
#[derive(Debug)]
pub struct ImageSetDataset {
    name: String,
    classes: &'static [&'static str],
    root: PathBuf,
    image_ids: Vec<String>,
}

impl ImageSetDataset {
    fn open(
        name: String,
        subdir: &str,
        split: &str,
        classes: &'static [&'static str],
    ) -> Result<Self> {
        let root = data_root().join(subdir);
        let list = root.join("ImageSets").join(format!("{split}.txt"));
        let raw = fs::read_to_string(&list)
            .with_context(|| format!("failed to read image set `{}`", list.display()))?;
        let image_ids: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        log::debug!("{}: {} images", name, image_ids.len());

        Ok(Self {
            name,
            classes,
            root,
            image_ids,
        })
    }
}

impl Dataset for ImageSetDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn classes(&self) -> &[&'static str] {
        self.classes
    }

    fn num_images(&self) -> usize {
        self.image_ids.len()
    }

    fn image_id_at(&self, index: usize) -> &str {
        &self.image_ids[index]
    }

    fn image_path_at(&self, index: usize) -> PathBuf {
        self.root
            .join("Images")
            .join(format!("{}.jpg", self.image_ids[index]))
    }

    fn evaluate_detections(
        &self,
        table: &DetectionTable,
        output_dir: &Path,
        nuisance_type: &str,
        baseline_method: bool,
        ovthresh: f32,
    ) -> Result<()> {
        write_voc_results(self, table, output_dir, nuisance_type, baseline_method)?;
        log::info!(
            "results for `{}` are ready for AP computation at IoU {}",
            self.name,
            ovthresh
        );
        Ok(())
    }
}

/// Writes one VOC-style result file per non-background class.
///
/// Each line is `image_id score x1 y1 x2 y2` in original image pixels. Files land under
/// `<output_dir>/results/<nuisance_type>/<method>/`.
fn write_voc_results(
    dataset: &dyn Dataset,
    table: &DetectionTable,
    output_dir: &Path,
    nuisance_type: &str,
    baseline_method: bool,
) -> Result<()> {
    let method = if baseline_method { "baseline" } else { "adv" };
    let results_dir = output_dir.join("results").join(nuisance_type).join(method);
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("failed to create `{}`", results_dir.display()))?;

    for (class_index, class) in dataset.classes().iter().enumerate().skip(1) {
        let mut out = String::new();
        for image in 0..dataset.num_images() {
            for det in table.get(class_index, image) {
                let b = det.bbox();
                writeln!(
                    out,
                    "{} {:.3} {:.1} {:.1} {:.1} {:.1}",
                    dataset.image_id_at(image),
                    det.score(),
                    b.x1,
                    b.y1,
                    b.x2,
                    b.y2,
                )
                .unwrap();
            }
        }

        let path = results_dir.join(format!("det_{}_{}.txt", dataset.name(), class));
        fs::write(&path, out).with_context(|| format!("failed to write `{}`", path.display()))?;
        log::debug!("wrote {} results to {}", class, path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_builtin_names() {
        let names = list_datasets();
        assert!(names.contains(&"uav_2017_test".to_string()));
        assert!(names.contains(&"uav_2017_trainvaltest".to_string()));
        assert!(names.contains(&"visdrone_2017_trainval".to_string()));
    }

    #[test]
    fn unknown_names_fail_lookup() {
        let err = get_dataset("voc_2007_test").unwrap_err();
        assert!(err.downcast_ref::<LookupError>().is_some());
        assert_eq!(err.to_string(), "unknown dataset: voc_2007_test");
    }
}
