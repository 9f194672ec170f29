//! The test-time evaluation loop.
//!
//! One-time setup loads and filters a checkpoint into the model runtime; afterwards every image
//! goes through forward pass → box decoding → per-class suppression → cross-class cap, and its
//! detections are recorded into the run-wide table. After the last image the table is serialized
//! and handed to the dataset's evaluation sink.

use std::{
    fs,
    fs::File,
    io::BufWriter,
    path::Path,
};

use anyhow::{bail, Context, Result};

use crate::{
    checkpoint::Checkpoint,
    config::Config,
    dataset::Dataset,
    detection::{
        decode::BoxDecoder,
        nms::NonMaxSuppression,
        Detection, DetectionTable,
    },
    nn::{ForwardOutput, ModelRuntime},
    nuisance::NuisanceConfig,
    timer::Timer,
    vis,
};

/// File name of the serialized detection table, under the run's output directory.
pub const DET_FILE: &str = "detections.json";

/// Per-run options derived from the command line.
pub struct EvalOptions {
    pub nuisance: NuisanceConfig,
    pub class_agnostic: bool,
    pub vis: bool,
    pub ovthresh: f32,
    pub baseline_method: bool,
}

/// Loads the checkpoint at `path` into `runtime`, dropping the nuisance-head parameters.
///
/// A pooling mode recorded in the checkpoint overrides the configured one. Must complete before
/// the first forward pass.
pub fn load_checkpoint_into<R: ModelRuntime>(
    runtime: &mut R,
    path: &Path,
    cfg: &mut Config,
) -> Result<()> {
    log::info!("load checkpoint {}", path.display());
    let mut checkpoint = Checkpoint::load(path)?;
    checkpoint.strip_nuisance_keys();

    let merged = checkpoint.overlay(runtime.state_dict())?;
    runtime.load_state_dict(merged)?;

    if let Some(mode) = checkpoint.pooling_mode {
        log::debug!("checkpoint overrides pooling mode: {}", mode);
        cfg.pooling_mode = mode;
    }

    log::info!("load model successfully!");
    Ok(())
}

/// Post-processes one image's raw outputs into the detection table.
///
/// For every non-background class the decoded candidates are filtered, sorted and suppressed;
/// the finished lists are recorded at `(class, image)` and the image-wide cap is applied last.
pub fn postprocess_image(
    output: &ForwardOutput,
    decoder: &BoxDecoder,
    nms: &mut NonMaxSuppression,
    table: &mut DetectionTable,
    image: usize,
    max_per_image: usize,
) {
    assert_eq!(
        output.scores.ncols(),
        table.num_classes(),
        "score columns must match the dataset's class count"
    );

    let decoded = decoder.decode(&output.rois, &output.deltas, &output.im_info);
    for class in 1..table.num_classes() {
        let mut candidates: Vec<Detection> = output
            .scores
            .column(class)
            .iter()
            .enumerate()
            .map(|(proposal, &score)| Detection::new(score, decoded.class_box(class, proposal)))
            .collect();

        let survivors: Vec<Detection> = nms.process(&mut candidates).collect();
        table.set(class, image, survivors);
    }

    table.cap_image(image, max_per_image);
}

/// Runs the evaluation loop over the whole split and hands the result to the evaluation sink.
///
/// `output_dir` must already exist; a missing output directory aborts before any inference.
pub fn run<R: ModelRuntime>(
    runtime: &mut R,
    dataset: &dyn Dataset,
    cfg: &Config,
    opts: &EvalOptions,
    output_dir: &Path,
) -> Result<()> {
    if !output_dir.is_dir() {
        bail!(
            "output directory `{}` does not exist",
            output_dir.display()
        );
    }

    let num_classes = dataset.classes().len();
    let num_images = dataset.num_images();
    let mut table = DetectionTable::new(num_classes, num_images);

    let decoder = BoxDecoder::new(cfg.bbox_reg, opts.class_agnostic, cfg.delta_normalization());
    let mut nms = NonMaxSuppression::new(cfg.score_thresh);
    nms.set_iou_thresh(cfg.nms_thresh);

    let images_dir = output_dir.join("images");
    if opts.vis {
        fs::create_dir_all(&images_dir)
            .with_context(|| format!("failed to create `{}`", images_dir.display()))?;
    }

    let mut t_detect = Timer::new("im_detect");
    let mut t_misc = Timer::new("misc");
    for index in 0..num_images {
        let output = t_detect.time(|| runtime.forward(index))?;
        t_misc.time(|| {
            postprocess_image(
                &output,
                &decoder,
                &mut nms,
                &mut table,
                index,
                cfg.max_per_image,
            )
        });

        if opts.vis {
            visualize(dataset, index, &table, &images_dir)?;
        }

        log::info!(
            "im_detect: {}/{} {:.3}s {:.3}s",
            index + 1,
            num_images,
            t_detect.last().as_secs_f64(),
            t_misc.last().as_secs_f64(),
        );
    }
    log::debug!("{} | {}", t_detect, t_misc);

    let det_file = output_dir.join(DET_FILE);
    let file = File::create(&det_file)
        .with_context(|| format!("failed to create `{}`", det_file.display()))?;
    serde_json::to_writer(BufWriter::new(file), &table)
        .with_context(|| format!("failed to serialize `{}`", det_file.display()))?;
    log::debug!("wrote detection table to {}", det_file.display());

    log::info!("evaluating detections");
    dataset.evaluate_detections(
        &table,
        output_dir,
        opts.nuisance.nuisance_type(),
        opts.baseline_method,
        opts.ovthresh,
    )
}

/// Draws the image's surviving detections and saves them as `result<index>.png`.
fn visualize(
    dataset: &dyn Dataset,
    index: usize,
    table: &DetectionTable,
    images_dir: &Path,
) -> Result<()> {
    let path = dataset.image_path_at(index);
    let mut image = image::open(&path)
        .with_context(|| format!("failed to open image `{}`", path.display()))?
        .to_rgb8();

    for class in 1..table.num_classes() {
        vis::draw_detections(&mut image, table.get(class, index));
    }

    let out = images_dir.join(format!("result{index}.png"));
    image
        .save(&out)
        .with_context(|| format!("failed to save `{}`", out.display()))?;
    Ok(())
}
