//! Linear-scaling curve ("katrol").
//!
//! Every component of a student is curved against the class range of the
//! *weighted final*, not against a per-component range. Values already at or
//! above the pass threshold are left untouched.

use crate::calc::{average_formative, round_off_1_decimal, weighted_final};
use crate::model::{ClassRange, CurveParameters, CurvedScores, PassStatus, RawResult};

pub fn curve_value(value: Option<f64>, range: ClassRange, params: CurveParameters) -> Option<f64> {
    let value = value?;
    let threshold = params.pass_threshold;
    let ceiling = params.target_ceiling;

    if value >= threshold {
        return Some(value);
    }
    if range.min_final == range.max_final {
        return Some(threshold);
    }

    let position = (value - range.min_final) / (range.max_final - range.min_final);
    let scaled = threshold + position * (ceiling - threshold);
    // A component below the class minimum final would otherwise land under
    // the threshold.
    Some(round_off_1_decimal(scaled).min(ceiling).max(threshold))
}

/// `None` when the student has no raw weighted final; such students are not
/// curved at all.
pub fn curve_student(
    raw: &RawResult,
    range: ClassRange,
    params: CurveParameters,
) -> Option<CurvedScores> {
    raw.final_weighted?;

    let components = raw.components.map(|v| curve_value(v, range, params));
    let final_weighted = weighted_final(&components)?;
    Some(CurvedScores {
        components,
        average_formative: average_formative(&components),
        final_weighted,
        status: PassStatus::from_final(final_weighted, params.pass_threshold),
    })
}
