//! Motility analysis core for computer-assisted sperm analysis (CASA).
//!
//! Frames are run through a [`Detector`], detections are linked into
//! tracks by the [`Tracker`], each finalized track is measured by the
//! [`KinematicsCalculator`] and the population is aggregated and
//! classified into a [`Report`].
//!
//! ```no_run
//! use casa::{run_analysis, AnalysisConfig, CalibrationSettings, CancellationToken, DetectionLog, NoProgress};
//!
//! let log = DetectionLog::from_file("detections.log")?;
//! let calibration = CalibrationSettings::new(0.5, 25.0);
//! let outcome = run_analysis(
//!     log.frame_source(calibration.frame_rate),
//!     log.clone(),
//!     calibration,
//!     AnalysisConfig::default(),
//!     NoProgress,
//!     &CancellationToken::new(),
//! )?;
//!
//! if let Some(report) = outcome.report() {
//!     println!("{}: {}", report.interpretation, report.notes);
//! }
//! # Ok::<(), casa::error::Error>(())
//! ```

pub mod classifier;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod kinematics;
pub mod math;
pub mod pipeline;
pub mod population;
pub mod report;
pub mod rolling_avg;
pub mod source;
pub mod track;
pub mod tracker;

mod circular_queue;
mod predictor;

pub use classifier::Interpretation;
pub use config::{AnalysisConfig, CalibrationSettings};
pub use detection::{ClassLabel, Detection};
pub use detector::{Detector, InferenceBackend, YoloDetector};
pub use frame::Frame;
pub use kinematics::{KinematicsCalculator, TrackKinematics};
pub use pipeline::{
    run_analysis, AnalysisJob, AnalysisOutcome, CancellationToken, ChannelProgress, NoProgress,
    Progress, ProgressSink,
};
pub use population::{MotilityGrade, PopulationMetrics};
pub use report::Report;
pub use source::{DetectionLog, FrameSource};
pub use track::{Track, TrackState};
pub use tracker::Tracker;

pub use error::Error;
