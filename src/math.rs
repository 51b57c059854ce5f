use nalgebra as na;
use num_traits::Float;

/// Least-squares fit of `y = a * x + b`, returns `[a, b]`.
///
/// Needs at least two distinct `x` values, otherwise the system is singular.
/// Non-finite samples make the fit undefined.
pub fn linear_ls<T: na::RealField + Float>(
    x: &na::DVector<T>,
    y: &na::DVector<T>,
) -> Option<na::Matrix2x1<T>> {
    if x.len() < 2 || x.len() != y.len() || x.iter().all(|v| *v == x[0]) {
        return None;
    }

    if x.iter().chain(y.iter()).any(|v| !Float::is_finite(*v)) {
        return None;
    }

    let n = T::from_usize(x.len())?;

    let s_x = x.sum();
    let s_x2 = x.map(|x| x * x).sum();
    let s_xy = x.zip_map(y, |x, y| x * y).sum();
    let s_y = y.sum();

    let a = na::Matrix2::new(s_x2, s_x, s_x, n);
    let b = na::Matrix2x1::new(s_xy, s_y);

    let qr_result = a.qr();
    let qty = qr_result.q().transpose() * b;

    qr_result.r().solve_upper_triangular(&qty)
}

/// Total length of a polyline.
pub fn path_length(points: &[na::Point2<f64>]) -> f64 {
    points
        .windows(2)
        .map(|w| na::distance(&w[0], &w[1]))
        .sum()
}

/// Signed perpendicular offset of `pt` from the line through `origin` along
/// `dir`. Positive on the left of the direction of travel.
pub fn lateral_offset(origin: &na::Point2<f64>, dir: &na::Vector2<f64>, pt: &na::Point2<f64>) -> f64 {
    let norm = dir.norm();
    if norm <= f64::EPSILON {
        return 0.0;
    }

    let d = pt - origin;

    (dir.x * d.y - dir.y * d.x) / norm
}
