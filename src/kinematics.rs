use rayon::prelude::*;
use serde_derive::Serialize;

use crate::config::{CalibrationSettings, KinematicsConfig};
use crate::math::{lateral_offset, path_length};
use crate::rolling_avg::RollingAvg;
use crate::track::Track;
use nalgebra as na;

/// Velocity and shape metrics of one finalized track.
///
/// Velocities are in µm/s, ALH in µm, BCF in Hz. Every metric is `None`
/// when the track cannot be measured (fewer than two positions or no
/// elapsed time); a ratio is `None` when its denominator is zero.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct TrackKinematics {
    pub track_id: u32,
    pub vcl: Option<f64>,
    pub vsl: Option<f64>,
    pub vap: Option<f64>,
    pub lin: Option<f64>,
    pub str: Option<f64>,
    pub wob: Option<f64>,
    pub alh: Option<f64>,
    pub bcf: Option<f64>,
    /// First to last position, µm.
    pub net_displacement_um: Option<f64>,
    pub elapsed_s: Option<f64>,
    pub is_valid_for_analysis: bool,
}

impl TrackKinematics {
    pub fn invalid(track_id: u32) -> Self {
        Self {
            track_id,
            vcl: None,
            vsl: None,
            vap: None,
            lin: None,
            str: None,
            wob: None,
            alh: None,
            bcf: None,
            net_displacement_um: None,
            elapsed_s: None,
            is_valid_for_analysis: false,
        }
    }
}

#[inline]
fn ratio(num: f64, den: f64) -> Option<f64> {
    if den > 0.0 {
        Some((num / den).clamp(0.0, 1.0))
    } else {
        None
    }
}

pub struct KinematicsCalculator {
    calibration: CalibrationSettings,
    config: KinematicsConfig,
}

impl KinematicsCalculator {
    pub fn new(calibration: CalibrationSettings, config: KinematicsConfig) -> Self {
        Self {
            calibration,
            config,
        }
    }

    pub fn compute(&self, track: &Track) -> TrackKinematics {
        if track.len() < 2 {
            return TrackKinematics::invalid(track.id);
        }

        let frames = (track.end_frame() - track.start_frame()) as f64;
        let elapsed = frames / self.calibration.frame_rate;
        if !(elapsed.is_finite() && elapsed > 0.0) {
            return TrackKinematics::invalid(track.id);
        }

        let scale = self.calibration.microns_per_pixel;
        let raw: Vec<na::Point2<f64>> = track
            .points
            .iter()
            .map(|p| na::Point2::from(p.point().coords * scale))
            .collect();

        let smoothed = RollingAvg::new(self.config.smoothing_window).smooth(&raw);

        let curvilinear = path_length(&raw);
        let average = path_length(&smoothed);
        let straight = na::distance(&raw[0], &raw[raw.len() - 1]);

        let vcl = curvilinear / elapsed;
        let vsl = straight / elapsed;
        let vap = average / elapsed;

        let deviations: Vec<f64> = raw
            .iter()
            .enumerate()
            .map(|(i, p)| lateral_offset(&smoothed[i], &RollingAvg::tangent(&smoothed, i), p))
            .collect();

        let alh = 2.0 * deviations.iter().fold(0.0f64, |acc, d| acc.max(d.abs()));
        let crossings = count_crossings(&deviations, self.config.crossing_tolerance_um);

        TrackKinematics {
            track_id: track.id,
            vcl: Some(vcl),
            vsl: Some(vsl),
            vap: Some(vap),
            lin: ratio(vsl, vcl),
            str: ratio(vsl, vap),
            wob: ratio(vap, vcl),
            alh: Some(alh),
            bcf: Some(crossings as f64 / elapsed),
            net_displacement_um: Some(straight),
            elapsed_s: Some(elapsed),
            is_valid_for_analysis: true,
        }
    }

    /// Computes every track in parallel; output order follows `tracks`.
    pub fn compute_all(&self, tracks: &[Track]) -> Vec<TrackKinematics> {
        tracks.par_iter().map(|t| self.compute(t)).collect()
    }
}

/// Sign changes of the lateral deviation, ignoring values inside the
/// tolerance band.
fn count_crossings(deviations: &[f64], tolerance: f64) -> usize {
    let mut prev_positive: Option<bool> = None;
    let mut crossings = 0;

    for &d in deviations {
        if d.abs() <= tolerance {
            continue;
        }

        let positive = d > 0.0;
        if let Some(prev) = prev_positive {
            if prev != positive {
                crossings += 1;
            }
        }
        prev_positive = Some(positive);
    }

    crossings
}
