use serde_derive::{Deserialize, Serialize};
use std::path::Path;

use crate::detection::ClassLabel;
use crate::error::Error;

/// Spatial and temporal calibration of one recording.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSettings {
    pub microns_per_pixel: f64,
    /// frames/sec
    pub frame_rate: f64,
    pub temperature_c: f64,
}

impl CalibrationSettings {
    pub fn new(microns_per_pixel: f64, frame_rate: f64) -> Self {
        Self {
            microns_per_pixel,
            frame_rate,
            temperature_c: 37.0,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.microns_per_pixel.is_finite() && self.microns_per_pixel > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "microns_per_pixel must be positive, got {}",
                self.microns_per_pixel
            )));
        }

        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(Error::InvalidCalibration(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }

        if !self.temperature_c.is_finite() {
            return Err(Error::InvalidCalibration("temperature_c is not finite".into()));
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMetric {
    /// Euclidean distance in µm between predicted and detected centers.
    Distance,
    /// `1 - IoU` between the predicted box and the detection.
    Iou,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive hits required to promote Tentative -> Confirmed
    pub min_hits: u32,
    /// Consecutive misses after which a track is terminated
    pub max_misses: u32,
    /// Maximum association cost, in the unit of `metric`
    pub gating_threshold: f64,
    pub metric: AssociationMetric,
    /// Detections below this confidence are dropped before association
    pub min_confidence: f32,
    pub tracked_classes: Vec<ClassLabel>,
    /// Positions used to fit the constant-velocity model
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_hits: 3,
            max_misses: 5,
            gating_threshold: 10.0,
            metric: AssociationMetric::Distance,
            min_confidence: 0.25,
            tracked_classes: vec![ClassLabel::Sperm],
            history_len: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Moving-average window (in positions) used for the average path
    pub smoothing_window: usize,
    /// Lateral deviations below this (µm) do not count as a crossing
    pub crossing_tolerance_um: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 5,
            crossing_tolerance_um: 0.05,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MotilityConfig {
    /// Minimum VSL (µm/s) for a progressive grade
    pub progressive_vsl_um_s: f64,
    /// Minimum STR for a progressive grade
    pub progressive_min_str: f64,
    /// Net displacement (µm) below which a cell is immotile
    pub immotile_displacement_um: f64,
    /// Imaged sample volume (µL) used for concentration
    pub sample_volume_ul: f64,
}

impl Default for MotilityConfig {
    fn default() -> Self {
        Self {
            progressive_vsl_um_s: 25.0,
            progressive_min_str: 0.8,
            immotile_displacement_um: 3.0,
            // 320 x 240 µm field, 20 µm chamber depth
            sample_volume_ul: 0.001536,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// million/mL (WHO 2010)
    pub low_concentration: f64,
    /// % progressive (WHO 2010)
    pub low_progressive_motility: f64,
    /// % total motility (WHO 2010)
    pub low_total_motility: f64,
    /// Mean VAP (µm/s) reported as sluggish in the notes
    pub low_mean_vap_um_s: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            low_concentration: 15.0,
            low_progressive_motility: 32.0,
            low_total_motility: 40.0,
            low_mean_vap_um_s: 25.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub max_track_summaries: usize,
    pub max_path_points: usize,
    pub max_frame_buckets: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_track_summaries: 200,
            max_path_points: 32,
            max_frame_buckets: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frames decoded and detected together before tracking
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { batch_size: 8 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub tracker: TrackerConfig,
    pub kinematics: KinematicsConfig,
    pub motility: MotilityConfig,
    pub classifier: ClassifierConfig,
    pub report: ReportConfig,
    pub pipeline: PipelineConfig,
}

impl AnalysisConfig {
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        let config: AnalysisConfig = serde_json::from_str(s)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;

        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.tracker;
        if t.min_hits == 0 {
            return Err(Error::InvalidConfig("tracker.min_hits must be at least 1".into()));
        }
        if t.max_misses == 0 {
            return Err(Error::InvalidConfig("tracker.max_misses must be at least 1".into()));
        }
        if !(t.gating_threshold.is_finite() && t.gating_threshold > 0.0) {
            return Err(Error::InvalidConfig("tracker.gating_threshold must be positive".into()));
        }
        if t.metric == AssociationMetric::Iou && t.gating_threshold > 1.0 {
            return Err(Error::InvalidConfig(
                "tracker.gating_threshold must be within (0, 1] for the iou metric".into(),
            ));
        }
        if !(0.0..=1.0).contains(&t.min_confidence) {
            return Err(Error::InvalidConfig("tracker.min_confidence must be within [0, 1]".into()));
        }
        if t.history_len < 2 {
            return Err(Error::InvalidConfig("tracker.history_len must be at least 2".into()));
        }

        if self.kinematics.smoothing_window == 0 {
            return Err(Error::InvalidConfig("kinematics.smoothing_window must be at least 1".into()));
        }
        if !non_negative(self.kinematics.crossing_tolerance_um) {
            return Err(Error::InvalidConfig("kinematics.crossing_tolerance_um must not be negative".into()));
        }

        let m = &self.motility;
        if !non_negative(m.progressive_vsl_um_s) || !non_negative(m.immotile_displacement_um) {
            return Err(Error::InvalidConfig("motility thresholds must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&m.progressive_min_str) {
            return Err(Error::InvalidConfig("motility.progressive_min_str must be within [0, 1]".into()));
        }
        // zero or negative disables concentration
        if !m.sample_volume_ul.is_finite() {
            return Err(Error::InvalidConfig("motility.sample_volume_ul must be finite".into()));
        }

        let c = &self.classifier;
        for (name, value) in [
            ("low_concentration", c.low_concentration),
            ("low_progressive_motility", c.low_progressive_motility),
            ("low_total_motility", c.low_total_motility),
            ("low_mean_vap_um_s", c.low_mean_vap_um_s),
        ] {
            if !non_negative(value) {
                return Err(Error::InvalidConfig(format!(
                    "classifier.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.pipeline.batch_size == 0 {
            return Err(Error::InvalidConfig("pipeline.batch_size must be at least 1".into()));
        }

        Ok(())
    }
}

#[inline]
fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_who_2010() {
        let c = AnalysisConfig::default();
        assert_eq!(c.classifier.low_concentration, 15.0);
        assert_eq!(c.classifier.low_progressive_motility, 32.0);
        assert_eq!(c.classifier.low_total_motility, 40.0);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let c = AnalysisConfig::from_json_str(
            r#"{ "tracker": { "min_hits": 4, "metric": "iou", "gating_threshold": 0.8 },
                 "classifier": { "low_concentration": 16.0 } }"#,
        )
        .unwrap();

        assert_eq!(c.tracker.min_hits, 4);
        assert_eq!(c.tracker.metric, AssociationMetric::Iou);
        assert_eq!(c.tracker.max_misses, 5);
        assert_eq!(c.classifier.low_concentration, 16.0);
        assert_eq!(c.classifier.low_progressive_motility, 32.0);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            AnalysisConfig::from_json_str(r#"{ "tracker": { "min_hits": 0 } }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_json_str(r#"{ "tracker": { "metric": "iou", "gating_threshold": 5.0 } }"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_json_str("{ not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn rejects_non_finite_thresholds() {
        let mut c = AnalysisConfig::default();
        c.classifier.low_concentration = f64::NAN;
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = AnalysisConfig::default();
        c.classifier.low_progressive_motility = -1.0;
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = AnalysisConfig::default();
        c.motility.sample_volume_ul = f64::INFINITY;
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = AnalysisConfig::default();
        c.motility.progressive_vsl_um_s = f64::NAN;
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));

        let mut c = AnalysisConfig::default();
        c.motility.sample_volume_ul = 0.0;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn calibration_validation() {
        assert!(CalibrationSettings::new(0.5, 25.0).validate().is_ok());
        assert!(CalibrationSettings::new(0.0, 25.0).validate().is_err());
        assert!(CalibrationSettings::new(0.5, f64::NAN).validate().is_err());
        assert!(CalibrationSettings::new(0.5, -1.0).validate().is_err());
    }
}
