//! Curving session: decides between a frozen existing snapshot and a fresh
//! computation, and gates every write behind an explicit confirmation.

use crate::calc;
use crate::curve::curve_student;
use crate::error::{CurveError, CurveResult};
use crate::model::{
    CurveParameters, CurvePreview, CurveScope, CurveSource, CurvedResult, CurvedScores,
    PreviewRow, RawResult, SaveOutcome, Student,
};
use crate::repo::ScoreRepository;
use chrono::{SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveMeta {
    pub processed_by: String,
    pub processed_at: String,
}

impl SaveMeta {
    pub fn now(processed_by: impl Into<String>) -> Self {
        Self {
            processed_by: processed_by.into(),
            processed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

fn validated(params: CurveParameters) -> CurveResult<CurveParameters> {
    CurveParameters::new(params.pass_threshold, params.target_ceiling)
}

/// Read-only. Returns the persisted snapshot unchanged when one exists for
/// the scope, otherwise a freshly computed preview.
pub fn compute_curve<R: ScoreRepository>(
    repo: &R,
    scope: &CurveScope,
    params: CurveParameters,
) -> CurveResult<CurvePreview> {
    let params = validated(params)?;
    let existing = repo.load_existing_curve(scope)?;
    if !existing.is_empty() {
        return preview_existing(repo, scope, existing);
    }
    compute_fresh(repo, scope, params)
}

/// Read-only. Ignores any persisted snapshot.
pub fn recompute_curve<R: ScoreRepository>(
    repo: &R,
    scope: &CurveScope,
    params: CurveParameters,
) -> CurveResult<CurvePreview> {
    let params = validated(params)?;
    compute_fresh(repo, scope, params)
}

/// The only mutating call. Every row is upserted on its own; a failing row is
/// reported and the batch carries on. A reused snapshot is already persisted
/// and is refused.
pub fn save_curve<R: ScoreRepository>(
    repo: &R,
    preview: &CurvePreview,
    meta: &SaveMeta,
) -> CurveResult<Vec<SaveOutcome>> {
    if preview.is_reused() {
        return Err(CurveError::InvalidState(
            "preview is an existing snapshot; recompute before saving".to_string(),
        ));
    }
    Ok(save_rows(repo, preview, meta, None))
}

fn compute_fresh<R: ScoreRepository>(
    repo: &R,
    scope: &CurveScope,
    params: CurveParameters,
) -> CurveResult<CurvePreview> {
    let roster = repo.load_roster(&scope.class_id, &scope.year)?;
    if roster.is_empty() {
        return Err(CurveError::NoEligibleStudents { roster_size: 0 });
    }
    let scores = repo.load_raw_scores(scope)?;
    let raw = calc::aggregate(&roster, &scores);
    let range = calc::class_range(&raw)?;
    debug!(
        min_final = range.min_final,
        max_final = range.max_final,
        roster = roster.len(),
        "class range"
    );

    let roster_size = roster.len();
    let rows = roster
        .into_iter()
        .zip(raw)
        .map(|(student, raw)| PreviewRow {
            curved: curve_student(&raw, range, params),
            student,
            raw,
        })
        .collect();

    Ok(CurvePreview {
        scope: scope.clone(),
        params,
        range,
        roster_size,
        raw_digest: calc::raw_digest(&scores),
        source: CurveSource::Computed,
        raw_changed_since_curve: false,
        rows,
    })
}

fn preview_existing<R: ScoreRepository>(
    repo: &R,
    scope: &CurveScope,
    existing: Vec<CurvedResult>,
) -> CurveResult<CurvePreview> {
    let roster = repo.load_roster(&scope.class_id, &scope.year)?;
    let current_digest = calc::raw_digest(&repo.load_raw_scores(scope)?);
    let names: HashMap<&str, &Student> = roster.iter().map(|s| (s.id.as_str(), s)).collect();

    let first = &existing[0];
    let params = first.params;
    let range = first.range;
    let roster_size = first.roster_size;
    let stored_digest = first.raw_digest.clone();
    let raw_changed_since_curve = existing
        .iter()
        .any(|r| r.raw_digest.as_deref().is_some_and(|d| d != current_digest));

    let rows = existing
        .into_iter()
        .map(|r| {
            let student = names.get(r.student_id.as_str()).map(|s| (*s).clone()).unwrap_or_else(|| {
                // Deactivated since the curve was saved.
                Student {
                    id: r.student_id.clone(),
                    display_name: r.student_id.clone(),
                    registration_no: None,
                }
            });
            let curved = match (r.curved_final, r.status) {
                (Some(final_weighted), Some(status)) => Some(CurvedScores {
                    components: r.curved,
                    average_formative: r.curved_average_formative,
                    final_weighted,
                    status,
                }),
                _ => None,
            };
            PreviewRow {
                student,
                raw: RawResult {
                    student_id: r.student_id,
                    components: r.raw,
                    average_formative: r.raw_average_formative,
                    final_weighted: r.raw_final,
                },
                curved,
            }
        })
        .collect();

    Ok(CurvePreview {
        scope: scope.clone(),
        params,
        range,
        roster_size,
        raw_digest: stored_digest.unwrap_or(current_digest),
        source: CurveSource::Existing,
        raw_changed_since_curve,
        rows,
    })
}

fn to_curved_result(
    preview: &CurvePreview,
    row: &PreviewRow,
    curved: &CurvedScores,
    meta: &SaveMeta,
) -> CurvedResult {
    CurvedResult {
        student_id: row.student.id.clone(),
        scope: preview.scope.clone(),
        raw: row.raw.components,
        raw_average_formative: row.raw.average_formative,
        raw_final: row.raw.final_weighted,
        curved: curved.components,
        curved_average_formative: curved.average_formative,
        curved_final: Some(curved.final_weighted),
        status: Some(curved.status),
        params: preview.params,
        range: preview.range,
        roster_size: preview.roster_size,
        raw_digest: Some(preview.raw_digest.clone()),
        processed_by: meta.processed_by.clone(),
        processed_at: meta.processed_at.clone(),
    }
}

fn save_rows<R: ScoreRepository>(
    repo: &R,
    preview: &CurvePreview,
    meta: &SaveMeta,
    only: Option<&HashSet<String>>,
) -> Vec<SaveOutcome> {
    let mut outcomes = Vec::with_capacity(preview.rows.len());
    for row in &preview.rows {
        let student_id = row.student.id.clone();
        if only.is_some_and(|ids| !ids.contains(&student_id)) {
            continue;
        }
        let Some(curved) = &row.curved else {
            // A row from an earlier run would mix two curves in one scope.
            let outcome = match repo.delete_curved(&preview.scope, &student_id) {
                Ok(removed) => SaveOutcome::Skipped {
                    student_id,
                    reason: if removed {
                        "no complete raw final; previous curve removed".to_string()
                    } else {
                        "no complete raw final".to_string()
                    },
                },
                Err(e) => {
                    warn!(%student_id, error = %e, "stale curved row not removed");
                    SaveOutcome::Failed {
                        student_id,
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
            continue;
        };

        let record = to_curved_result(preview, row, curved, meta);
        match repo.upsert_curved(&record) {
            Ok(()) => outcomes.push(SaveOutcome::Saved { student_id }),
            Err(e) => {
                warn!(%student_id, error = %e, "curved row not saved");
                outcomes.push(SaveOutcome::Failed {
                    student_id,
                    error: e.to_string(),
                });
            }
        }
    }
    outcomes
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Checking,
    /// A persisted snapshot was found. Only `force_recompute` leaves this.
    Loaded(CurvePreview),
    NeedsCompute,
    NothingToCurve {
        roster_size: usize,
    },
    Computed(CurvePreview),
    Saving,
    Saved {
        preview: CurvePreview,
        outcomes: Vec<SaveOutcome>,
    },
    SaveFailed {
        preview: CurvePreview,
        outcomes: Vec<SaveOutcome>,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Checking => "checking",
            SessionState::Loaded(_) => "loaded",
            SessionState::NeedsCompute => "needsCompute",
            SessionState::NothingToCurve { .. } => "nothingToCurve",
            SessionState::Computed(_) => "computed",
            SessionState::Saving => "saving",
            SessionState::Saved { .. } => "saved",
            SessionState::SaveFailed { .. } => "saveFailed",
        }
    }

    pub fn preview(&self) -> Option<&CurvePreview> {
        match self {
            SessionState::Loaded(p) | SessionState::Computed(p) => Some(p),
            SessionState::Saved { preview, .. } | SessionState::SaveFailed { preview, .. } => {
                Some(preview)
            }
            _ => None,
        }
    }

    pub fn outcomes(&self) -> Option<&[SaveOutcome]> {
        match self {
            SessionState::Saved { outcomes, .. } | SessionState::SaveFailed { outcomes, .. } => {
                Some(outcomes)
            }
            _ => None,
        }
    }
}

/// One operator's curving run for one scope.
#[derive(Debug)]
pub struct CurveSession {
    scope: CurveScope,
    params: CurveParameters,
    state: SessionState,
}

impl CurveSession {
    pub fn new(scope: CurveScope, params: CurveParameters) -> CurveResult<Self> {
        Ok(Self {
            scope,
            params: validated(params)?,
            state: SessionState::Idle,
        })
    }

    pub fn scope(&self) -> &CurveScope {
        &self.scope
    }

    pub fn params(&self) -> CurveParameters {
        self.params
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// New parameters invalidate whatever the session was showing.
    pub fn set_params(&mut self, params: CurveParameters) -> CurveResult<()> {
        let params = validated(params)?;
        if params != self.params {
            self.params = params;
            self.state = SessionState::Idle;
        }
        Ok(())
    }

    pub fn request_load<R: ScoreRepository>(&mut self, repo: &R) -> CurveResult<&SessionState> {
        self.state = SessionState::Checking;
        let existing = match repo.load_existing_curve(&self.scope) {
            Ok(v) => v,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
        };

        if !existing.is_empty() {
            let preview = match preview_existing(repo, &self.scope, existing) {
                Ok(p) => p,
                Err(e) => {
                    self.state = SessionState::Idle;
                    return Err(e);
                }
            };
            info!(
                class_id = %self.scope.class_id,
                subject = %self.scope.subject,
                rows = preview.rows.len(),
                raw_changed = preview.raw_changed_since_curve,
                "reusing existing curve"
            );
            self.state = SessionState::Loaded(preview);
            return Ok(&self.state);
        }

        self.state = SessionState::NeedsCompute;
        self.compute(repo)
    }

    /// Operator override of the freeze: recompute from raw scores even when a
    /// snapshot exists. Saving afterwards overwrites the snapshot.
    pub fn force_recompute<R: ScoreRepository>(&mut self, repo: &R) -> CurveResult<&SessionState> {
        info!(
            class_id = %self.scope.class_id,
            subject = %self.scope.subject,
            "forced recompute"
        );
        self.state = SessionState::NeedsCompute;
        self.compute(repo)
    }

    fn compute<R: ScoreRepository>(&mut self, repo: &R) -> CurveResult<&SessionState> {
        match compute_fresh(repo, &self.scope, self.params) {
            Ok(preview) => {
                info!(
                    class_id = %self.scope.class_id,
                    subject = %self.scope.subject,
                    rows = preview.rows.len(),
                    "curve computed"
                );
                self.state = SessionState::Computed(preview);
            }
            Err(CurveError::NoEligibleStudents { roster_size }) => {
                info!(
                    class_id = %self.scope.class_id,
                    subject = %self.scope.subject,
                    roster_size,
                    "nothing to curve"
                );
                self.state = SessionState::NothingToCurve { roster_size };
            }
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
        }
        Ok(&self.state)
    }

    /// Persist the reviewed preview. After a partial failure, `only` restricts
    /// the retry to the given students; earlier outcomes of the others are
    /// kept.
    pub fn confirm_save<R: ScoreRepository>(
        &mut self,
        repo: &R,
        meta: &SaveMeta,
        only: Option<&HashSet<String>>,
    ) -> CurveResult<&[SaveOutcome]> {
        let (preview, previous) = match std::mem::replace(&mut self.state, SessionState::Saving) {
            SessionState::Computed(p) => {
                if only.is_some() {
                    self.state = SessionState::Computed(p);
                    return Err(CurveError::config(
                        "studentIds is only accepted when retrying a failed save",
                    ));
                }
                (p, Vec::new())
            }
            SessionState::SaveFailed { preview, outcomes } => (preview, outcomes),
            other => {
                let name = other.name();
                self.state = other;
                return Err(CurveError::InvalidState(format!(
                    "nothing to save in state {name}; compute a curve first"
                )));
            }
        };

        let attempt = save_rows(repo, &preview, meta, only);
        let outcomes = merge_outcomes(previous, attempt);
        let failed = outcomes.iter().filter(|o| o.is_failed()).count();
        info!(
            class_id = %self.scope.class_id,
            subject = %self.scope.subject,
            rows = outcomes.len(),
            failed,
            processed_by = %meta.processed_by,
            "curve saved"
        );

        self.state = if failed > 0 {
            SessionState::SaveFailed { preview, outcomes }
        } else {
            SessionState::Saved { preview, outcomes }
        };
        Ok(self.state.outcomes().unwrap_or(&[]))
    }
}

fn merge_outcomes(previous: Vec<SaveOutcome>, attempt: Vec<SaveOutcome>) -> Vec<SaveOutcome> {
    if previous.is_empty() {
        return attempt;
    }
    let mut latest: HashMap<String, SaveOutcome> = attempt
        .into_iter()
        .map(|o| (o.student_id().to_string(), o))
        .collect();
    previous
        .into_iter()
        .map(|o| latest.remove(o.student_id()).unwrap_or(o))
        .collect()
}
