use serde_derive::Serialize;

use crate::config::MotilityConfig;
use crate::kinematics::TrackKinematics;

/// WHO motility grade of a single cell.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MotilityGrade {
    Progressive,
    NonProgressive,
    Immotile,
}

/// Grades one track; `None` for tracks that could not be measured.
pub fn grade(k: &TrackKinematics, config: &MotilityConfig) -> Option<MotilityGrade> {
    if !k.is_valid_for_analysis {
        return None;
    }

    let displacement = k.net_displacement_um?;
    if displacement < config.immotile_displacement_um {
        return Some(MotilityGrade::Immotile);
    }

    let vsl = k.vsl.unwrap_or(0.0);
    let straightness = k.str.unwrap_or(0.0);

    if vsl >= config.progressive_vsl_um_s && straightness >= config.progressive_min_str {
        Some(MotilityGrade::Progressive)
    } else {
        Some(MotilityGrade::NonProgressive)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct PopulationMetrics {
    /// Tracks ever confirmed.
    pub total_count: usize,
    /// Tracks with measurable kinematics.
    pub tracked_count: usize,
    /// million/mL
    pub concentration: Option<f64>,
    pub progressive_motility: f64,
    pub non_progressive_motility: f64,
    pub immotile_percent: f64,
    pub total_motility: f64,
    pub vcl: Option<f64>,
    pub vsl: Option<f64>,
    pub vap: Option<f64>,
    pub lin: Option<f64>,
    pub str: Option<f64>,
    pub wob: Option<f64>,
    pub alh: Option<f64>,
    pub bcf: Option<f64>,
}

impl PopulationMetrics {
    #[inline]
    pub fn has_measurements(&self) -> bool {
        self.tracked_count > 0
    }
}

fn mean<I: Iterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));

    (n > 0).then(|| sum / n as f64)
}

#[inline]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

/// Combines per-track kinematics into population statistics.
///
/// `total_count` is the number of confirmed tracks, which can exceed
/// `kinematics.len()` when short tracks were never measured.
pub fn aggregate(
    total_count: usize,
    kinematics: &[TrackKinematics],
    config: &MotilityConfig,
) -> PopulationMetrics {
    let valid: Vec<&TrackKinematics> = kinematics
        .iter()
        .filter(|k| k.is_valid_for_analysis)
        .collect();
    let tracked = valid.len();

    let (mut progressive, mut non_progressive, mut immotile) = (0, 0, 0);
    for k in &valid {
        match grade(k, config) {
            Some(MotilityGrade::Progressive) => progressive += 1,
            Some(MotilityGrade::NonProgressive) => non_progressive += 1,
            Some(MotilityGrade::Immotile) => immotile += 1,
            None => (),
        }
    }

    // µL -> mL, cells -> millions
    let concentration = (config.sample_volume_ul > 0.0)
        .then(|| total_count as f64 / (config.sample_volume_ul * 1.0e-3) / 1.0e6);

    let progressive_motility = percent(progressive, tracked);
    let non_progressive_motility = percent(non_progressive, tracked);

    PopulationMetrics {
        total_count,
        tracked_count: tracked,
        concentration,
        progressive_motility,
        non_progressive_motility,
        immotile_percent: percent(immotile, tracked),
        total_motility: progressive_motility + non_progressive_motility,
        vcl: mean(valid.iter().map(|k| k.vcl)),
        vsl: mean(valid.iter().map(|k| k.vsl)),
        vap: mean(valid.iter().map(|k| k.vap)),
        lin: mean(valid.iter().map(|k| k.lin)),
        str: mean(valid.iter().map(|k| k.str)),
        wob: mean(valid.iter().map(|k| k.wob)),
        alh: mean(valid.iter().map(|k| k.alh)),
        bcf: mean(valid.iter().map(|k| k.bcf)),
    }
}
