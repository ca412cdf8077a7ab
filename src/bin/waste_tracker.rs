//! waste_tracker - annotate one waterway video and report floating waste
//!
//! 1. Loads configuration (TOML file + environment) and CLI overrides
//! 2. Selects a detector/tracker backend
//! 3. Runs the video through the tracking pipeline into an annotated output
//! 4. Prints `{"video_path": ..., "tracking_stats": ...}` to stdout

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use std::io::IsTerminal;
use std::path::PathBuf;

use waste_tracker::{
    Annotator, BackendRegistry, CancelToken, DetectionCapability, Pipeline, ReplayBackend,
    ScriptedBackend, TrackerConfig,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video file, image directory, or stub://<frames>[@WxH].
    #[arg(long)]
    input: String,
    /// Annotated output: a .mp4/.mkv/.avi/.mov file or a frame directory.
    #[arg(long, default_value = "processed_video.mp4")]
    output: PathBuf,
    /// Recorded detector/tracker output (JSON Lines) for the replay backend.
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Detector backend name (replay|scripted).
    #[arg(long)]
    backend: Option<String>,
    /// Also write the report JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        TrackerConfig::load()?
    };
    if let Some(path) = args.detections {
        cfg.detections_path = Some(path);
    }
    if let Some(backend) = args.backend {
        cfg.backend = Some(backend.to_lowercase());
    }

    let mut registry = {
        let _stage = ui.stage("Load detector backend");
        let mut registry = BackendRegistry::new();
        if let Some(path) = &cfg.detections_path {
            registry.register(ReplayBackend::from_path(path)?);
        }
        registry.register(ScriptedBackend::empty());
        let name = cfg.backend.clone().unwrap_or_else(|| {
            if cfg.detections_path.is_some() {
                "replay".to_string()
            } else {
                "scripted".to_string()
            }
        });
        if name == "replay" && cfg.detections_path.is_none() {
            return Err(anyhow!(
                "replay backend needs a recording (--detections or WASTE_TRACKER_DETECTIONS)"
            ));
        }
        registry.set_default(&name)?;
        registry
    };
    let backend = registry.backend_for_capability(DetectionCapability::Tracking)?;
    log::info!("using detector backend {}", backend.name());

    let annotator = Annotator::new(&cfg.annotation)?;
    if !annotator.has_font() {
        log::warn!("no usable font found; labels will be omitted (set WASTE_TRACKER_FONT)");
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("error setting Ctrl-C handler")?;

    let outcome = {
        let progress = ui.frames("Process video");
        let mut pipeline = Pipeline::new(backend, &annotator, cfg.categories.clone())
            .with_cancel(cancel)
            .with_frame_budget(cfg.frame_budget)
            .with_progress(|done| progress.set_frames(done));
        pipeline.process_video(&args.input, &args.output, &cfg.video)?
    };

    let video_path = outcome.output.unwrap_or(args.output);
    let response = json!({
        "video_path": video_path.display().to_string(),
        "tracking_stats": outcome.report,
    });
    if let Some(path) = &args.report {
        let _stage = ui.stage("Write report");
        std::fs::write(path, serde_json::to_vec_pretty(&outcome.report)?)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    log::info!(
        "{} frames written, {} detection failures, {} tracks",
        outcome.stats.frames_written,
        outcome.stats.detection_failures,
        outcome.stats.tracks
    );
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
