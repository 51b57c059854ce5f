use super::circular_queue::CircularQueue;
use super::math::linear_ls;
use nalgebra as na;

/// Constant-velocity motion model fitted over the most recent positions.
///
/// Each axis is fitted independently as a line over frame index, so a
/// track seen at frames with gaps still gets a per-frame velocity.
#[derive(Debug, Clone)]
pub struct Predictor {
    history: CircularQueue<(f64, na::Point2<f64>)>,
    /// Fitted position at the newest frame.
    anchor: na::Point2<f64>,
    anchor_frame: f64,
    /// Pixels per frame.
    velocity: na::Vector2<f64>,
    pub has_velocity: bool,
}

impl Predictor {
    pub fn new(history_len: usize) -> Self {
        Self {
            history: CircularQueue::with_capacity(history_len.max(2)),
            anchor: na::Point2::origin(),
            anchor_frame: 0.0,
            velocity: na::Vector2::zeros(),
            has_velocity: false,
        }
    }

    pub fn update(&mut self, frame: usize, pos: na::Point2<f64>) {
        let frame = frame as f64;
        self.history.push((frame, pos));
        self.anchor = pos;
        self.anchor_frame = frame;
        self.has_velocity = false;
        self.velocity = na::Vector2::zeros();

        if self.history.len() < 2 {
            return;
        }

        // frames are expressed relative to the newest one to keep the
        // normal equations well conditioned on long videos
        let n = self.history.len();
        let t = na::DVector::from_iterator(n, self.history.asc_iter().map(|(f, _)| f - frame));
        let xs = na::DVector::from_iterator(n, self.history.asc_iter().map(|(_, p)| p.x));
        let ys = na::DVector::from_iterator(n, self.history.asc_iter().map(|(_, p)| p.y));

        if let (Some(fx), Some(fy)) = (linear_ls(&t, &xs), linear_ls(&t, &ys)) {
            self.velocity = na::Vector2::new(fx[0], fy[0]);
            self.anchor = na::Point2::new(fx[1], fy[1]);
            self.has_velocity = true;
        }
    }

    /// Expected position at `frame`.
    #[inline]
    pub fn predict(&self, frame: usize) -> na::Point2<f64> {
        if self.has_velocity {
            self.anchor + self.velocity * (frame as f64 - self.anchor_frame)
        } else {
            self.anchor
        }
    }

    #[inline]
    pub fn velocity(&self) -> Option<na::Vector2<f64>> {
        self.has_velocity.then_some(self.velocity)
    }
}
