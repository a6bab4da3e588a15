use crate::calc::round_off_1_decimal;
use crate::error::{CurveError, CurveResult};
use serde::{Deserialize, Serialize};

/// The closed set of assessment components that feed a weighted final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Component {
    Formative1,
    Formative2,
    Formative3,
    MidTerm,
    FinalTerm,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Formative1,
        Component::Formative2,
        Component::Formative3,
        Component::MidTerm,
        Component::FinalTerm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::Formative1 => "formative1",
            Component::Formative2 => "formative2",
            Component::Formative3 => "formative3",
            Component::MidTerm => "midTerm",
            Component::FinalTerm => "finalTerm",
        }
    }

    pub fn parse(s: &str) -> Option<Component> {
        Component::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

/// One value per component; `None` means the score was never recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScores {
    pub formative1: Option<f64>,
    pub formative2: Option<f64>,
    pub formative3: Option<f64>,
    pub mid_term: Option<f64>,
    pub final_term: Option<f64>,
}

impl ComponentScores {
    pub fn get(&self, c: Component) -> Option<f64> {
        match c {
            Component::Formative1 => self.formative1,
            Component::Formative2 => self.formative2,
            Component::Formative3 => self.formative3,
            Component::MidTerm => self.mid_term,
            Component::FinalTerm => self.final_term,
        }
    }

    pub fn set(&mut self, c: Component, value: Option<f64>) {
        let slot = match c {
            Component::Formative1 => &mut self.formative1,
            Component::Formative2 => &mut self.formative2,
            Component::Formative3 => &mut self.formative3,
            Component::MidTerm => &mut self.mid_term,
            Component::FinalTerm => &mut self.final_term,
        };
        *slot = value;
    }

    pub fn map(&self, mut f: impl FnMut(Option<f64>) -> Option<f64>) -> ComponentScores {
        let mut out = ComponentScores::default();
        for c in Component::ALL {
            out.set(c, f(self.get(c)));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub display_name: String,
    pub registration_no: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRow {
    pub student_id: String,
    pub component: Component,
    pub value: f64,
}

/// {class, subject, year, semester}; with a student id this is the natural key
/// of a curved result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveScope {
    pub class_id: String,
    pub subject: String,
    pub year: String,
    pub semester: String,
}

impl CurveScope {
    pub fn new(
        class_id: impl Into<String>,
        subject: impl Into<String>,
        year: impl Into<String>,
        semester: impl Into<String>,
    ) -> CurveResult<Self> {
        let scope = CurveScope {
            class_id: class_id.into().trim().to_string(),
            subject: subject.into().trim().to_string(),
            year: year.into().trim().to_string(),
            semester: semester.into().trim().to_string(),
        };
        for (name, value) in [
            ("classId", &scope.class_id),
            ("subject", &scope.subject),
            ("year", &scope.year),
            ("semester", &scope.semester),
        ] {
            if value.is_empty() {
                return Err(CurveError::config(format!("missing required filter {name}")));
            }
        }
        Ok(scope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveParameters {
    pub pass_threshold: f64,
    pub target_ceiling: f64,
}

impl CurveParameters {
    /// Range checks (0-100) belong to the caller; only ordering is enforced.
    pub fn new(pass_threshold: f64, target_ceiling: f64) -> CurveResult<Self> {
        if !pass_threshold.is_finite() || !target_ceiling.is_finite() {
            return Err(CurveError::config(
                "passThreshold and targetCeiling must be finite numbers",
            ));
        }
        if pass_threshold > target_ceiling {
            return Err(CurveError::config(format!(
                "passThreshold ({pass_threshold}) must be <= targetCeiling ({target_ceiling})"
            )));
        }
        Ok(CurveParameters {
            pass_threshold,
            target_ceiling,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    pub student_id: String,
    pub components: ComponentScores,
    pub average_formative: Option<f64>,
    pub final_weighted: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRange {
    pub min_final: f64,
    pub max_final: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassStatus {
    #[serde(rename = "Tuntas")]
    Passed,
    #[serde(rename = "Belum Tuntas")]
    NotPassed,
}

impl PassStatus {
    /// Judged on the final as displayed, rounded to one decimal.
    pub fn from_final(curved_final: f64, pass_threshold: f64) -> PassStatus {
        if round_off_1_decimal(curved_final) >= pass_threshold {
            PassStatus::Passed
        } else {
            PassStatus::NotPassed
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PassStatus::Passed => "Tuntas",
            PassStatus::NotPassed => "Belum Tuntas",
        }
    }

    pub fn parse(s: &str) -> Option<PassStatus> {
        match s {
            "Tuntas" => Some(PassStatus::Passed),
            "Belum Tuntas" => Some(PassStatus::NotPassed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvedScores {
    pub components: ComponentScores,
    pub average_formative: Option<f64>,
    pub final_weighted: f64,
    pub status: PassStatus,
}

/// Persisted snapshot, one per (student, subject, class, year, semester).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvedResult {
    pub student_id: String,
    pub scope: CurveScope,
    pub raw: ComponentScores,
    pub raw_average_formative: Option<f64>,
    pub raw_final: Option<f64>,
    pub curved: ComponentScores,
    pub curved_average_formative: Option<f64>,
    pub curved_final: Option<f64>,
    pub status: Option<PassStatus>,
    pub params: CurveParameters,
    pub range: ClassRange,
    pub roster_size: usize,
    pub raw_digest: Option<String>,
    pub processed_by: String,
    pub processed_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CurveSource {
    Computed,
    Existing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub student: Student,
    pub raw: RawResult,
    pub curved: Option<CurvedScores>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurvePreview {
    pub scope: CurveScope,
    pub params: CurveParameters,
    pub range: ClassRange,
    pub roster_size: usize,
    pub raw_digest: String,
    pub source: CurveSource,
    /// Only meaningful for `CurveSource::Existing`.
    pub raw_changed_since_curve: bool,
    pub rows: Vec<PreviewRow>,
}

impl CurvePreview {
    pub fn is_reused(&self) -> bool {
        self.source == CurveSource::Existing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SaveOutcome {
    #[serde(rename_all = "camelCase")]
    Saved { student_id: String },
    #[serde(rename_all = "camelCase")]
    Skipped { student_id: String, reason: String },
    #[serde(rename_all = "camelCase")]
    Failed { student_id: String, error: String },
}

impl SaveOutcome {
    pub fn student_id(&self) -> &str {
        match self {
            SaveOutcome::Saved { student_id }
            | SaveOutcome::Skipped { student_id, .. }
            | SaveOutcome::Failed { student_id, .. } => student_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SaveOutcome::Failed { .. })
    }
}
