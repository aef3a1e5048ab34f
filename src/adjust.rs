use crate::types::{InputRecord, RegionalStats, Subdivision, MONTHS};

/// Final probability plus the confidence band it falls in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjusted {
    pub probability: f64,
    pub confidence: &'static str,
}

/// Heuristic correction chain applied to the raw classifier output. The
/// steps are ordered and cumulative; each consumes the previous one's
/// result. Pure function of its inputs.
///
/// `region` is present only when the record's one-hot flags identify a
/// subdivision with known statistics; an unrecognized region skips the
/// whole regional branch.
pub fn adjust_prediction(
    raw: f64,
    record: &InputRecord,
    region: Option<(Subdivision, &RegionalStats)>,
) -> Adjusted {
    // 1. Blend toward the region's historical rain rate.
    let mut p = match region {
        Some((_, stats)) => raw * 0.7 + stats.rain_probability * 0.3,
        None => raw,
    };

    // 2. Bound to a probability before any further arithmetic.
    p = p.clamp(0.0, 1.0);

    // Confidence reflects the model-plus-regional estimate, not the
    // seasonal boosts below.
    let confidence = confidence_label(p);

    // 3. Monsoon season over a high-rainfall region.
    if record.flag("MONSOON")
        && region.map(|(sub, _)| sub.is_high_rainfall()).unwrap_or(false)
    {
        p = (p * 1.3).min(0.95);
    }

    // 4. Already raining today.
    if record.flag("RainToday") {
        p = (p * 1.15).min(0.95);
    }

    Adjusted {
        probability: p,
        confidence,
    }
}

/// Coarse confidence band. The Medium branch is written exactly as
/// documented even though the High check shadows part of its range.
pub fn confidence_label(p: f64) -> &'static str {
    if p > 0.8 || p < 0.2 {
        "High"
    } else if p > 0.65 || p < 0.35 {
        "Medium"
    } else {
        "Low"
    }
}

/// Annual rainfall derived from whatever monthly fields the caller
/// supplied. None when no monthly value was given.
pub fn calculated_annual_rainfall(record: &InputRecord) -> Option<f64> {
    let supplied: Vec<f64> = MONTHS.iter().filter_map(|m| record.supplied(m)).collect();
    if supplied.is_empty() {
        None
    } else {
        Some(supplied.iter().sum())
    }
}
