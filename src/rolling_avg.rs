use nalgebra as na;

/// Centered moving average over a polyline.
///
/// The window shrinks symmetrically near both ends, so the endpoints are
/// kept and evenly spaced collinear points map onto themselves.
#[derive(Debug, Clone, Copy)]
pub struct RollingAvg {
    half: usize,
}

impl RollingAvg {
    /// `window` is the full window length in points; even values are
    /// rounded down to the next odd length.
    pub fn new(window: usize) -> Self {
        Self {
            half: window.saturating_sub(1) / 2,
        }
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.half * 2 + 1
    }

    pub fn smooth(&self, points: &[na::Point2<f64>]) -> Vec<na::Point2<f64>> {
        let n = points.len();

        (0..n)
            .map(|i| {
                let k = self.half.min(i).min(n - 1 - i);
                let slice = &points[i - k..=i + k];
                let sum = slice
                    .iter()
                    .fold(na::Vector2::zeros(), |acc, p| acc + p.coords);

                na::Point2::from(sum / slice.len() as f64)
            })
            .collect()
    }

    /// Direction of travel along `smoothed` at `i`, from its neighbours.
    pub fn tangent(smoothed: &[na::Point2<f64>], i: usize) -> na::Vector2<f64> {
        let n = smoothed.len();
        if n < 2 {
            return na::Vector2::zeros();
        }

        let prev = smoothed[i.saturating_sub(1)];
        let next = smoothed[(i + 1).min(n - 1)];

        next - prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_is_unchanged() {
        let pts: Vec<_> = (0..10).map(|i| na::Point2::new(2.0 * i as f64, 1.0)).collect();
        let s = RollingAvg::new(5).smooth(&pts);

        for (a, b) in pts.iter().zip(&s) {
            assert!(na::distance(a, b) < 1e-12);
        }
    }

    #[test]
    fn zigzag_is_flattened() {
        let pts: Vec<_> = (0..9)
            .map(|i| na::Point2::new(i as f64, if i % 2 == 0 { 1.0 } else { -1.0 }))
            .collect();
        let s = RollingAvg::new(3).smooth(&pts);

        // endpoints are kept
        assert_eq!(s[0], pts[0]);
        assert_eq!(s[8], pts[8]);
        for p in &s[1..8] {
            assert!(p.y.abs() < 0.34);
        }
    }

    #[test]
    fn even_window_rounds_down() {
        assert_eq!(RollingAvg::new(4).window(), 3);
        assert_eq!(RollingAvg::new(1).window(), 1);
        assert_eq!(RollingAvg::new(0).window(), 1);
    }

    #[test]
    fn tangent_at_ends() {
        let pts = vec![na::Point2::new(0.0, 0.0), na::Point2::new(1.0, 0.0), na::Point2::new(3.0, 0.0)];
        assert_eq!(RollingAvg::tangent(&pts, 0), na::Vector2::new(1.0, 0.0));
        assert_eq!(RollingAvg::tangent(&pts, 1), na::Vector2::new(3.0, 0.0));
        assert_eq!(RollingAvg::tangent(&pts, 2), na::Vector2::new(2.0, 0.0));
        assert_eq!(RollingAvg::tangent(&pts[..1], 0), na::Vector2::zeros());
    }
}
