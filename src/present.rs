use crate::calc::round_off_1_decimal;
use crate::model::{Component, CurvePreview, PassStatus, SaveOutcome};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePair {
    pub component: Component,
    pub raw: Option<f64>,
    pub curved: Option<f64>,
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRow {
    pub student_id: String,
    pub display_name: String,
    pub registration_no: Option<String>,
    pub pairs: Vec<ScorePair>,
    pub raw_final: Option<f64>,
    pub curved_final: Option<f64>,
    pub status: Option<&'static str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub roster_size: usize,
    pub eligible: usize,
    pub curved: usize,
    pub passed: usize,
    pub not_passed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_student_ids: Vec<String>,
}

fn display(v: Option<f64>) -> Option<f64> {
    v.map(round_off_1_decimal)
}

/// Raw-vs-curved rows for screens and exports, values rounded to 1 decimal.
pub fn present_rows(preview: &CurvePreview) -> Vec<DisplayRow> {
    preview
        .rows
        .iter()
        .map(|row| {
            let curved = row.curved.as_ref();
            let pairs = Component::ALL
                .iter()
                .map(|&c| {
                    let raw = row.raw.components.get(c);
                    let cv = curved.and_then(|s| s.components.get(c));
                    ScorePair {
                        component: c,
                        raw: display(raw),
                        curved: display(cv),
                        changed: cv.is_some() && cv != raw,
                    }
                })
                .collect();
            DisplayRow {
                student_id: row.student.id.clone(),
                display_name: row.student.display_name.clone(),
                registration_no: row.student.registration_no.clone(),
                pairs,
                raw_final: display(row.raw.final_weighted),
                curved_final: display(curved.map(|s| s.final_weighted)),
                status: curved.map(|s| s.status.label()),
            }
        })
        .collect()
}

pub fn summarize(preview: &CurvePreview) -> PreviewSummary {
    let mut summary = PreviewSummary {
        roster_size: preview.roster_size,
        ..Default::default()
    };
    for row in &preview.rows {
        let Some(curved) = &row.curved else {
            continue;
        };
        summary.eligible += 1;
        if curved.components != row.raw.components {
            summary.curved += 1;
        }
        match curved.status {
            PassStatus::Passed => summary.passed += 1,
            PassStatus::NotPassed => summary.not_passed += 1,
        }
    }
    summary
}

pub fn summarize_outcomes(outcomes: &[SaveOutcome]) -> OutcomeCounts {
    let mut counts = OutcomeCounts::default();
    for o in outcomes {
        match o {
            SaveOutcome::Saved { .. } => counts.saved += 1,
            SaveOutcome::Skipped { .. } => counts.skipped += 1,
            SaveOutcome::Failed { student_id, .. } => {
                counts.failed += 1;
                counts.failed_student_ids.push(student_id.clone());
            }
        }
    }
    counts
}
