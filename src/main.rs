use std::{path::PathBuf, time::Instant};

use anyhow::{bail, Result};
use clap::Parser;

use uavdet::{
    config::Config,
    dataset,
    eval::{self, EvalOptions},
    nn::replay::ReplayRuntime,
    nuisance::{checkpoint_file, NuisanceConfig},
};

/// Evaluate an FPN aerial detector checkpoint on a registered dataset.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Dataset to evaluate on
    #[arg(long, default_value = "uav_2017_test")]
    dataset: String,

    /// Backbone variant tag, used in output paths (res50, res101, res152)
    #[arg(long, default_value = "res101")]
    net: String,

    /// Optional config file overriding the test-time defaults
    #[arg(long, value_name = "FILE")]
    cfg: Option<PathBuf>,

    /// Directory holding trained model variants
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Root the run's output directory is derived under (must exist)
    #[arg(long, default_value = "output")]
    output_root: PathBuf,

    /// Raw-output dump exported by the GPU runtime for this split
    #[arg(long, value_name = "FILE")]
    raw_outputs: PathBuf,

    /// Training session of the checkpoint to load
    #[arg(long, default_value_t = 1)]
    checksession: u32,

    /// Training epoch of the checkpoint to load
    #[arg(long, default_value_t = 4)]
    checkepoch: u32,

    /// Training step of the checkpoint to load
    #[arg(long, default_value_t = 3960)]
    checkpoint: u32,

    /// Relative weight of the adversarial altitude loss the model was trained with
    #[arg(long)]
    gamma_altitude: f64,

    /// Relative weight of the adversarial viewing-angle loss the model was trained with
    #[arg(long)]
    gamma_angle: f64,

    /// Relative weight of the adversarial weather loss the model was trained with
    #[arg(long)]
    gamma_weather: f64,

    /// Save images with the surviving detections drawn in
    #[arg(long)]
    vis: bool,

    /// Evaluate as the baseline method instead of the adversarial one
    #[arg(long)]
    is_baseline_method: bool,

    /// IoU threshold for evaluation
    #[arg(long, default_value_t = 0.7)]
    ovthresh: f32,

    /// Class-agnostic bounding-box regression
    #[arg(long)]
    cag: bool,
}

fn main() -> Result<()> {
    uavdet::init_logger!();
    let args = Args::parse();
    log::info!("called with args: {:?}", args);

    let mut cfg = match &args.cfg {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    log::debug!("using config: {:?}", cfg);

    let dataset = dataset::get_dataset(&args.dataset)?;
    log::info!("{}: {} images", dataset.name(), dataset.num_images());

    let nuisance = NuisanceConfig::new(args.gamma_altitude, args.gamma_angle, args.gamma_weather);
    let model_dir = nuisance.model_dir(&args.model_dir);
    if !model_dir.is_dir() {
        bail!(
            "there is no input directory for loading network from `{}`",
            model_dir.display()
        );
    }
    let ckpt_path = model_dir.join(checkpoint_file(
        args.checksession,
        args.checkepoch,
        args.checkpoint,
    ));

    let mut runtime = ReplayRuntime::open(&args.raw_outputs)?;
    eval::load_checkpoint_into(&mut runtime, &ckpt_path, &mut cfg)?;

    let output_dir = args
        .output_root
        .join(dataset.name())
        .join(format!("fpn_{}", args.net));

    let opts = EvalOptions {
        nuisance,
        class_agnostic: args.cag,
        vis: args.vis,
        ovthresh: args.ovthresh,
        baseline_method: args.is_baseline_method,
    };

    let start = Instant::now();
    eval::run(&mut runtime, dataset.as_ref(), &cfg, &opts, &output_dir)?;
    log::info!("test time: {:.4}s", start.elapsed().as_secs_f64());

    Ok(())
}
