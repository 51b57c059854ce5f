use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{AnalysisConfig, CalibrationSettings};
use crate::detector::Detector;
use crate::error::Error;
use crate::frame::Frame;
use crate::kinematics::KinematicsCalculator;
use crate::report::{FrameRecorder, Report};
use crate::source::FrameSource;
use crate::tracker::Tracker;
use crate::Detection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub frames_processed: usize,
    pub total_frames: Option<usize>,
    /// 0..=100, when the total is known
    pub percent: Option<f32>,
}

impl Progress {
    fn new(frames_processed: usize, total_frames: Option<usize>) -> Self {
        let percent = total_frames
            .filter(|&t| t > 0)
            .map(|t| (100.0 * frames_processed as f32 / t as f32).min(100.0));

        Self {
            frames_processed,
            total_frames,
            percent,
        }
    }
}

/// Receives advisory progress updates after every processed frame.
pub trait ProgressSink {
    fn report(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressSink for F {
    #[inline]
    fn report(&mut self, progress: Progress) {
        self(progress)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    #[inline]
    fn report(&mut self, _: Progress) {}
}

/// Forwards progress into a channel; a closed receiver is ignored.
pub struct ChannelProgress(pub Sender<Progress>);

impl ProgressSink for ChannelProgress {
    #[inline]
    fn report(&mut self, progress: Progress) {
        let _ = self.0.send(progress);
    }
}

/// Cooperative cancellation flag shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(Report),
    Cancelled,
}

impl AnalysisOutcome {
    pub fn report(&self) -> Option<&Report> {
        match self {
            AnalysisOutcome::Completed(report) => Some(report),
            AnalysisOutcome::Cancelled => None,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisOutcome::Cancelled)
    }
}

/// One analysis run: frames from `source`, detections from `detector`.
pub struct AnalysisJob<S, D> {
    source: S,
    detector: D,
    calibration: CalibrationSettings,
    config: AnalysisConfig,
}

impl<S: FrameSource, D: Detector> AnalysisJob<S, D> {
    pub fn new(
        source: S,
        detector: D,
        calibration: CalibrationSettings,
        config: AnalysisConfig,
    ) -> Result<Self, Error> {
        calibration.validate()?;
        config.validate()?;

        Ok(Self {
            source,
            detector,
            calibration,
            config,
        })
    }

    pub fn run<P: ProgressSink>(
        mut self,
        progress: &mut P,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, Error> {
        let total = self.source.frame_count_hint();
        info!(
            total_frames = ?total,
            frame_rate = self.calibration.frame_rate,
            microns_per_pixel = self.calibration.microns_per_pixel,
            "analysis started"
        );

        let mut tracker = Tracker::new(self.config.tracker.clone(), &self.calibration);
        let mut recorder = FrameRecorder::new(self.config.report.max_frame_buckets);
        let batch_size = self.config.pipeline.batch_size;

        let mut processed = 0;
        let mut batch: Vec<Frame> = Vec::with_capacity(batch_size);
        let mut exhausted = false;

        while !exhausted {
            batch.clear();

            while batch.len() < batch_size {
                if cancel.is_cancelled() {
                    return Ok(cancelled(processed));
                }

                match self.source.next_frame()? {
                    Some(frame) => batch.push(frame),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if batch.is_empty() {
                break;
            }

            let detections = self.detect_batch(&batch)?;

            for (frame, dets) in batch.iter().zip(&detections) {
                if cancel.is_cancelled() {
                    return Ok(cancelled(processed));
                }

                tracker.update(frame.index, dets)?;
                processed += 1;

                recorder.record(frame.index, dets.len(), tracker.active().count());
                progress.report(Progress::new(processed, total));
            }
        }

        if processed == 0 {
            return Err(Error::EmptyVideo);
        }

        // a cancel raised from the last progress update still wins
        if cancel.is_cancelled() {
            return Ok(cancelled(processed));
        }

        tracker.finish();
        let confirmed = tracker.confirmed_count();
        let tracks = tracker.into_finalized();

        let calculator = KinematicsCalculator::new(self.calibration, self.config.kinematics.clone());
        let kinematics = calculator.compute_all(&tracks);

        let report = Report::assemble(
            self.calibration,
            &self.config,
            processed,
            &tracks,
            &kinematics,
            recorder.into_buckets(),
        );

        info!(
            frames = processed,
            confirmed,
            measured = report.metrics.tracked_count,
            interpretation = %report.interpretation,
            "analysis finished"
        );

        Ok(AnalysisOutcome::Completed(report))
    }

    /// Runs the detector over a batch in parallel, keeping frame order.
    fn detect_batch(&self, batch: &[Frame]) -> Result<Vec<Vec<Detection>>, Error> {
        let detector = &self.detector;

        batch
            .par_iter()
            .map(|frame| {
                detector.detect(frame).map_err(|err| match err {
                    err @ Error::Detector { .. } => err,
                    other => Error::Detector {
                        frame: frame.index,
                        reason: other.to_string(),
                    },
                })
            })
            .collect()
    }
}

fn cancelled(processed: usize) -> AnalysisOutcome {
    info!(frames = processed, "analysis cancelled");
    debug!("partial tracks discarded");

    AnalysisOutcome::Cancelled
}

/// Runs a full analysis. `Err` carries the failure reason; cancellation
/// is reported as `AnalysisOutcome::Cancelled`.
pub fn run_analysis<S, D, P>(
    source: S,
    detector: D,
    calibration: CalibrationSettings,
    config: AnalysisConfig,
    mut progress: P,
    cancel: &CancellationToken,
) -> Result<AnalysisOutcome, Error>
where
    S: FrameSource,
    D: Detector,
    P: ProgressSink,
{
    AnalysisJob::new(source, detector, calibration, config)?.run(&mut progress, cancel)
}
