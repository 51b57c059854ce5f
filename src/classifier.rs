use serde_derive::Serialize;
use std::fmt;

use crate::config::ClassifierConfig;
use crate::population::PopulationMetrics;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    Normal,
    /// Low concentration.
    Oligospermia,
    /// Low progressive motility.
    Asthenospermia,
    /// Low concentration and low progressive motility.
    Oligoasthenospermia,
    /// Abnormal morphology. Needs a morphology assessment and is never
    /// derived from motility data.
    Teratospermia,
    /// No cells found.
    Azoospermia,
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Interpretation::Normal => "Normal",
            Interpretation::Oligospermia => "Oligospermia",
            Interpretation::Asthenospermia => "Asthenospermia",
            Interpretation::Oligoasthenospermia => "Oligoasthenospermia",
            Interpretation::Teratospermia => "Teratospermia",
            Interpretation::Azoospermia => "Azoospermia",
        };

        f.write_str(s)
    }
}

/// Ordered threshold rules, first match wins.
pub fn classify(m: &PopulationMetrics, config: &ClassifierConfig) -> Interpretation {
    if m.total_count == 0 {
        return Interpretation::Azoospermia;
    }

    let low_count = m
        .concentration
        .map(|c| c < config.low_concentration)
        .unwrap_or(false);
    let low_motility = m.progressive_motility < config.low_progressive_motility;

    match (low_count, low_motility) {
        (true, true) => Interpretation::Oligoasthenospermia,
        (true, false) => Interpretation::Oligospermia,
        (false, true) => Interpretation::Asthenospermia,
        (false, false) => Interpretation::Normal,
    }
}

/// Human readable assessment of each metric group.
pub fn notes(m: &PopulationMetrics, config: &ClassifierConfig) -> String {
    let mut out = Vec::with_capacity(4);

    if m.total_count == 0 {
        out.push("No cells were detected in the sample.".to_string());
    }

    out.push(match m.concentration {
        Some(c) if c < config.low_concentration => format!(
            "Concentration {:.1} M/mL is below the reference limit of {:.1} M/mL.",
            c, config.low_concentration
        ),
        Some(c) => format!(
            "Concentration {:.1} M/mL is within the reference range (>= {:.1} M/mL).",
            c, config.low_concentration
        ),
        None => "Concentration could not be determined: sample volume unknown.".to_string(),
    });

    if m.has_measurements() {
        let progressive = if m.progressive_motility < config.low_progressive_motility {
            format!(
                "Progressive motility {:.1}% is below the reference limit of {:.0}%",
                m.progressive_motility, config.low_progressive_motility
            )
        } else {
            format!(
                "Progressive motility {:.1}% is within the reference range",
                m.progressive_motility
            )
        };
        let total = if m.total_motility < config.low_total_motility {
            format!(
                "total motility {:.1}% is below the reference limit of {:.0}%.",
                m.total_motility, config.low_total_motility
            )
        } else {
            format!("total motility {:.1}% is within the reference range.", m.total_motility)
        };
        out.push(format!("{}; {}", progressive, total));

        out.push(match m.vap {
            Some(vap) if vap < config.low_mean_vap_um_s => format!(
                "Mean velocities are low (VAP {:.1} um/s, VCL {:.1} um/s, VSL {:.1} um/s).",
                vap,
                m.vcl.unwrap_or(0.0),
                m.vsl.unwrap_or(0.0)
            ),
            Some(vap) => format!(
                "Mean velocities are adequate (VAP {:.1} um/s, VCL {:.1} um/s, VSL {:.1} um/s).",
                vap,
                m.vcl.unwrap_or(0.0),
                m.vsl.unwrap_or(0.0)
            ),
            None => "Velocity could not be assessed: insufficient data.".to_string(),
        });
    } else if m.total_count > 0 {
        out.push("Motility and velocity could not be assessed: insufficient data.".to_string());
    }

    out.join(" ")
}
