use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use casa::{
    run_analysis, AnalysisConfig, AnalysisOutcome, CalibrationSettings, CancellationToken,
    DetectionLog, Progress,
};

/// Runs a motility analysis over pre-computed detections and prints the
/// report as JSON.
#[derive(Parser, Debug)]
#[command(name = "casa", version)]
struct Args {
    /// Detection log, one `<frame>: <json detections>` line per frame
    #[arg(long)]
    detections: PathBuf,

    /// Video to decode frames from; detections are still read from the log
    #[cfg(feature = "video")]
    #[arg(long)]
    video: Option<PathBuf>,

    /// Frames per second of the recording
    #[arg(long)]
    fps: f64,

    /// Spatial calibration
    #[arg(long = "mpp", value_name = "MICRONS_PER_PIXEL")]
    microns_per_pixel: f64,

    #[arg(long, default_value_t = 37.0)]
    temperature: f64,

    /// JSON analysis configuration; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("casa=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let calibration = CalibrationSettings {
        microns_per_pixel: args.microns_per_pixel,
        frame_rate: args.fps,
        temperature_c: args.temperature,
    };

    let log = DetectionLog::from_file(&args.detections)?;
    info!(frames = log.len(), "detections loaded");

    let mut last_percent = 0;
    let progress = |p: Progress| {
        if let Some(percent) = p.percent {
            let percent = percent as u32;
            if percent >= last_percent + 10 {
                last_percent = percent;
                info!("{}% done", percent);
            }
        }
    };

    let cancel = CancellationToken::new();

    #[cfg(feature = "video")]
    let outcome = match &args.video {
        Some(video) => {
            let source = casa::source::VideoSource::open(video)?;
            if let Some(fps) = source.frame_rate() {
                if (fps - calibration.frame_rate).abs() > 0.01 {
                    warn!(container = fps, calibration = calibration.frame_rate, "frame rate mismatch");
                }
            }
            run_analysis(source, log, calibration, config, progress, &cancel)?
        }
        None => run_analysis(
            log.frame_source(calibration.frame_rate),
            log,
            calibration,
            config,
            progress,
            &cancel,
        )?,
    };

    #[cfg(not(feature = "video"))]
    let outcome = run_analysis(
        log.frame_source(calibration.frame_rate),
        log,
        calibration,
        config,
        progress,
        &cancel,
    )?;

    let report = match outcome {
        AnalysisOutcome::Completed(report) => report,
        AnalysisOutcome::Cancelled => bail!("analysis cancelled"),
    };

    if report.insufficient_data {
        warn!("no track could be measured");
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?
        }
        None => println!("{}", json),
    }

    Ok(())
}
