use serde_derive::Serialize;

use crate::detection::Detection;
use crate::predictor::Predictor;
use nalgebra as na;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Seen, but not yet for `min_hits` consecutive frames.
    Tentative,
    Confirmed,
    /// Confirmed track that missed at least one frame.
    Lost,
    Terminated,
}

/// One recorded position of a track.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub frame: usize,
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl TrackPoint {
    #[inline]
    pub fn point(&self) -> na::Point2<f64> {
        na::Point2::new(self.x as f64, self.y as f64)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub state: TrackState,
    /// Set once the track has been promoted; survives later state changes.
    pub confirmed: bool,
    pub points: Vec<TrackPoint>,
    /// Consecutive matched frames.
    pub hits: u32,
    /// Frames since the last match.
    pub misses: u32,
    /// Last matched box, used for overlap based association.
    pub last_detection: Detection,
    pub(crate) predictor: Predictor,
}

impl Track {
    pub(crate) fn new(id: u32, frame: usize, det: &Detection, history_len: usize) -> Self {
        let mut predictor = Predictor::new(history_len);
        predictor.update(frame, na::Point2::new(det.x as f64, det.y as f64));

        Self {
            id,
            state: TrackState::Tentative,
            confirmed: false,
            points: vec![TrackPoint {
                frame,
                x: det.x,
                y: det.y,
                confidence: det.confidence,
            }],
            hits: 1,
            misses: 0,
            last_detection: *det,
            predictor,
        }
    }

    pub(crate) fn hit(&mut self, frame: usize, det: &Detection) {
        self.points.push(TrackPoint {
            frame,
            x: det.x,
            y: det.y,
            confidence: det.confidence,
        });
        self.predictor
            .update(frame, na::Point2::new(det.x as f64, det.y as f64));
        self.last_detection = *det;
        self.hits += 1;
        self.misses = 0;
    }

    #[inline]
    pub fn start_frame(&self) -> usize {
        self.points.first().map(|p| p.frame).unwrap_or(0)
    }

    #[inline]
    pub fn end_frame(&self) -> usize {
        self.points.last().map(|p| p.frame).unwrap_or(0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != TrackState::Terminated
    }

    /// Terminated track that had been confirmed; ready for kinematics.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.state == TrackState::Terminated && self.confirmed
    }

    #[inline]
    pub fn predict(&self, frame: usize) -> na::Point2<f64> {
        self.predictor.predict(frame)
    }

    /// Pixels per frame, once at least two positions are known.
    #[inline]
    pub fn velocity(&self) -> Option<na::Vector2<f64>> {
        self.predictor.velocity()
    }

    #[inline]
    pub fn mean_confidence(&self) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }

        self.points.iter().map(|p| p.confidence).sum::<f32>() / self.points.len() as f32
    }
}
