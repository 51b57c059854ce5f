use serde_derive::Serialize;

use crate::classifier::{classify, notes, Interpretation};
use crate::config::{AnalysisConfig, CalibrationSettings};
use crate::kinematics::TrackKinematics;
use crate::population::{aggregate, grade, MotilityGrade, PopulationMetrics};
use crate::track::Track;

/// Condensed view of one track for storage.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub id: u32,
    pub start_frame: usize,
    pub end_frame: usize,
    pub points: usize,
    pub mean_confidence: f32,
    pub grade: Option<MotilityGrade>,
    pub kinematics: TrackKinematics,
    /// Downsampled pixel path, first and last position included.
    pub path: Vec<[f32; 2]>,
}

/// Detection activity over a run of consecutive processed frames.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameBucket {
    pub first_frame: usize,
    pub last_frame: usize,
    pub frames: usize,
    pub detections: usize,
    pub max_active_tracks: usize,
}

impl FrameBucket {
    #[inline]
    pub fn mean_detections(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.detections as f64 / self.frames as f64
        }
    }

    fn merge(&mut self, other: &FrameBucket) {
        self.last_frame = other.last_frame;
        self.frames += other.frames;
        self.detections += other.detections;
        self.max_active_tracks = self.max_active_tracks.max(other.max_active_tracks);
    }
}

/// Keeps per-frame activity within a fixed number of buckets by doubling
/// the bucket width whenever the limit is exceeded.
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    max_buckets: usize,
    width: usize,
    buckets: Vec<FrameBucket>,
}

impl FrameRecorder {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            max_buckets,
            width: 1,
            buckets: Vec::with_capacity(max_buckets.min(1024) + 1),
        }
    }

    pub fn record(&mut self, frame: usize, detections: usize, active_tracks: usize) {
        if self.max_buckets == 0 {
            return;
        }

        let sample = FrameBucket {
            first_frame: frame,
            last_frame: frame,
            frames: 1,
            detections,
            max_active_tracks: active_tracks,
        };

        match self.buckets.last_mut() {
            Some(last) if last.frames < self.width => last.merge(&sample),
            _ => self.buckets.push(sample),
        }

        if self.buckets.len() > self.max_buckets {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let mut merged = Vec::with_capacity(self.buckets.len() / 2 + 1);

        for pair in self.buckets.chunks(2) {
            let mut bucket = pair[0].clone();
            if let Some(next) = pair.get(1) {
                bucket.merge(next);
            }
            merged.push(bucket);
        }

        self.buckets = merged;
        self.width *= 2;
    }

    pub fn into_buckets(self) -> Vec<FrameBucket> {
        self.buckets
    }
}

/// Final output of one analysis run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Report {
    pub calibration: CalibrationSettings,
    pub metrics: PopulationMetrics,
    pub interpretation: Interpretation,
    pub notes: String,
    /// No track could be measured; velocity figures are absent.
    pub insufficient_data: bool,
    pub frames_processed: usize,
    pub tracks: Vec<TrackSummary>,
    /// Measured tracks left out of `tracks` by the summary limit.
    pub truncated_tracks: usize,
    pub frame_summary: Vec<FrameBucket>,
}

impl Report {
    /// Aggregates, classifies and summarizes finalized tracks.
    ///
    /// `tracks` and `kinematics` are parallel slices.
    pub fn assemble(
        calibration: CalibrationSettings,
        config: &AnalysisConfig,
        frames_processed: usize,
        tracks: &[Track],
        kinematics: &[TrackKinematics],
        frame_summary: Vec<FrameBucket>,
    ) -> Report {
        let metrics = aggregate(tracks.len(), kinematics, &config.motility);
        let interpretation = classify(&metrics, &config.classifier);
        let notes = notes(&metrics, &config.classifier);

        let limit = config.report.max_track_summaries;
        let summaries: Vec<TrackSummary> = tracks
            .iter()
            .zip(kinematics)
            .take(limit)
            .map(|(t, k)| TrackSummary {
                id: t.id,
                start_frame: t.start_frame(),
                end_frame: t.end_frame(),
                points: t.len(),
                mean_confidence: t.mean_confidence(),
                grade: grade(k, &config.motility),
                kinematics: *k,
                path: downsample_path(t, config.report.max_path_points),
            })
            .collect();

        Report {
            calibration,
            insufficient_data: !metrics.has_measurements(),
            metrics,
            interpretation,
            notes,
            frames_processed,
            truncated_tracks: tracks.len().saturating_sub(summaries.len()),
            tracks: summaries,
            frame_summary,
        }
    }
}

fn downsample_path(track: &Track, max_points: usize) -> Vec<[f32; 2]> {
    let n = track.points.len();
    let at = |i: usize| [track.points[i].x, track.points[i].y];

    match max_points {
        0 => Vec::new(),
        _ if n <= max_points => (0..n).map(at).collect(),
        1 => vec![at(n - 1)],
        m => (0..m).map(|i| at(i * (n - 1) / (m - 1))).collect(),
    }
}
