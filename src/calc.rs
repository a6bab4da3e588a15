use crate::error::{CurveError, CurveResult};
use crate::model::{ClassRange, ComponentScores, RawResult, ScoreRow, Student};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const WEIGHT_FORMATIVE: f64 = 0.4;
pub const WEIGHT_MID_TERM: f64 = 0.3;
pub const WEIGHT_FINAL_TERM: f64 = 0.3;

/// Gradebook half-up 1-decimal rounding:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Mean of the three formatives, only when all three are present.
pub fn average_formative(scores: &ComponentScores) -> Option<f64> {
    let f1 = scores.formative1?;
    let f2 = scores.formative2?;
    let f3 = scores.formative3?;
    Some((f1 + f2 + f3) / 3.0)
}

/// 40/30/30 weighted final; undefined if any of its three inputs is.
pub fn weighted_final(scores: &ComponentScores) -> Option<f64> {
    let avg = average_formative(scores)?;
    let mid = scores.mid_term?;
    let fin = scores.final_term?;
    Some(avg * WEIGHT_FORMATIVE + mid * WEIGHT_MID_TERM + fin * WEIGHT_FINAL_TERM)
}

/// One `RawResult` per roster entry, in roster order. Rows for students not on
/// the roster are ignored.
pub fn aggregate(roster: &[Student], rows: &[ScoreRow]) -> Vec<RawResult> {
    let mut by_student: HashMap<&str, ComponentScores> = HashMap::new();
    for row in rows {
        by_student
            .entry(row.student_id.as_str())
            .or_default()
            .set(row.component, Some(row.value));
    }

    roster
        .iter()
        .map(|s| {
            let components = by_student
                .get(s.id.as_str())
                .copied()
                .unwrap_or_default();
            RawResult {
                student_id: s.id.clone(),
                components,
                average_formative: average_formative(&components),
                final_weighted: weighted_final(&components),
            }
        })
        .collect()
}

pub fn class_range(results: &[RawResult]) -> CurveResult<ClassRange> {
    let mut finals = results.iter().filter_map(|r| r.final_weighted);
    let Some(first) = finals.next() else {
        return Err(CurveError::NoEligibleStudents {
            roster_size: results.len(),
        });
    };
    let (min_final, max_final) = finals.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    Ok(ClassRange {
        min_final,
        max_final,
    })
}

/// SHA-256 over the raw score rows, independent of row order. Stored with a
/// curved snapshot so later loads can tell whether raw scores moved since.
pub fn raw_digest(rows: &[ScoreRow]) -> String {
    let mut lines: Vec<String> = rows
        .iter()
        .map(|r| format!("{}|{}|{}", r.student_id, r.component.as_str(), r.value))
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
