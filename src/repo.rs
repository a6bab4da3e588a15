use crate::error::{CurveError, CurveResult};
use crate::model::{
    ClassRange, Component, ComponentScores, CurveParameters, CurveScope, CurvedResult, PassStatus,
    ScoreRow, Student,
};
use rusqlite::{Connection, ErrorCode, Row};
use uuid::Uuid;

/// Read side plus the single-row upsert used by the save batch.
///
/// Reads have no side effects. Upserts are independent of each other; a batch
/// is a loop over `upsert_curved`, never one transaction.
pub trait ScoreRepository {
    /// Active students only, ordered by display name.
    fn load_roster(&self, class_id: &str, year: &str) -> CurveResult<Vec<Student>>;

    /// One row per recorded (student, component) score.
    fn load_raw_scores(&self, scope: &CurveScope) -> CurveResult<Vec<ScoreRow>>;

    fn load_existing_curve(&self, scope: &CurveScope) -> CurveResult<Vec<CurvedResult>>;

    fn upsert_curved(&self, row: &CurvedResult) -> CurveResult<()>;

    /// Drops the persisted row for one natural key. `true` when a row existed.
    fn delete_curved(&self, scope: &CurveScope, student_id: &str) -> CurveResult<bool>;
}

pub struct SqliteRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ScoreRepository for SqliteRepository<'_> {
    fn load_roster(&self, class_id: &str, year: &str) -> CurveResult<Vec<Student>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, display_name, registration_no
                 FROM students
                 WHERE class_id = ? AND year = ? AND active = 1
                 ORDER BY display_name, id",
            )
            .map_err(CurveError::io("load roster"))?;
        let roster = stmt
            .query_map((class_id, year), |r| {
                Ok(Student {
                    id: r.get(0)?,
                    display_name: r.get(1)?,
                    registration_no: r.get(2)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CurveError::io("load roster"))?;
        Ok(roster)
    }

    fn load_raw_scores(&self, scope: &CurveScope) -> CurveResult<Vec<ScoreRow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT student_id, component, value
                 FROM assessment_scores
                 WHERE class_id = ? AND subject = ? AND year = ? AND semester = ?
                 ORDER BY student_id, component",
            )
            .map_err(CurveError::io("load raw scores"))?;
        let rows = stmt
            .query_map(
                (&scope.class_id, &scope.subject, &scope.year, &scope.semester),
                |r| {
                    let student_id: String = r.get(0)?;
                    let component: String = r.get(1)?;
                    let value: f64 = r.get(2)?;
                    Ok((student_id, component, value))
                },
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CurveError::io("load raw scores"))?;

        let mut out = Vec::with_capacity(rows.len());
        for (student_id, component, value) in rows {
            // Unknown component names come from other screens' data; they are
            // not part of the weighted model.
            let Some(component) = Component::parse(&component) else {
                tracing::debug!(%student_id, %component, "ignoring unknown score component");
                continue;
            };
            out.push(ScoreRow {
                student_id,
                component,
                value,
            });
        }
        Ok(out)
    }

    fn load_existing_curve(&self, scope: &CurveScope) -> CurveResult<Vec<CurvedResult>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT cr.student_id,
                        cr.raw_formative1, cr.raw_formative2, cr.raw_formative3,
                        cr.raw_mid_term, cr.raw_final_term,
                        cr.raw_average_formative, cr.raw_final,
                        cr.curved_formative1, cr.curved_formative2, cr.curved_formative3,
                        cr.curved_mid_term, cr.curved_final_term,
                        cr.curved_average_formative, cr.curved_final,
                        cr.status, cr.pass_threshold, cr.target_ceiling,
                        cr.class_min, cr.class_max, cr.roster_size,
                        cr.raw_digest, cr.processed_by, cr.processed_at
                 FROM curved_results cr
                 LEFT JOIN students s ON s.id = cr.student_id
                 WHERE cr.class_id = ? AND cr.subject = ? AND cr.year = ? AND cr.semester = ?
                 ORDER BY s.display_name, cr.student_id",
            )
            .map_err(CurveError::io("load existing curve"))?;
        let existing = stmt
            .query_map(
                (&scope.class_id, &scope.subject, &scope.year, &scope.semester),
                |r| curved_from_row(r, scope),
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(CurveError::io("load existing curve"))?;
        Ok(existing)
    }

    fn upsert_curved(&self, row: &CurvedResult) -> CurveResult<()> {
        let id = Uuid::new_v4().to_string();
        let status = row.status.map(|s| s.label());
        self.conn
            .execute(
                "INSERT INTO curved_results(
                    id, student_id, subject, class_id, year, semester,
                    raw_formative1, raw_formative2, raw_formative3, raw_mid_term, raw_final_term,
                    raw_average_formative, raw_final,
                    curved_formative1, curved_formative2, curved_formative3,
                    curved_mid_term, curved_final_term,
                    curved_average_formative, curved_final,
                    status, pass_threshold, target_ceiling, class_min, class_max, roster_size,
                    raw_digest, processed_by, processed_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                        ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, subject, class_id, year, semester) DO UPDATE SET
                   raw_formative1 = excluded.raw_formative1,
                   raw_formative2 = excluded.raw_formative2,
                   raw_formative3 = excluded.raw_formative3,
                   raw_mid_term = excluded.raw_mid_term,
                   raw_final_term = excluded.raw_final_term,
                   raw_average_formative = excluded.raw_average_formative,
                   raw_final = excluded.raw_final,
                   curved_formative1 = excluded.curved_formative1,
                   curved_formative2 = excluded.curved_formative2,
                   curved_formative3 = excluded.curved_formative3,
                   curved_mid_term = excluded.curved_mid_term,
                   curved_final_term = excluded.curved_final_term,
                   curved_average_formative = excluded.curved_average_formative,
                   curved_final = excluded.curved_final,
                   status = excluded.status,
                   pass_threshold = excluded.pass_threshold,
                   target_ceiling = excluded.target_ceiling,
                   class_min = excluded.class_min,
                   class_max = excluded.class_max,
                   roster_size = excluded.roster_size,
                   raw_digest = excluded.raw_digest,
                   processed_by = excluded.processed_by,
                   processed_at = excluded.processed_at",
                rusqlite::params![
                    id,
                    row.student_id,
                    row.scope.subject,
                    row.scope.class_id,
                    row.scope.year,
                    row.scope.semester,
                    row.raw.formative1,
                    row.raw.formative2,
                    row.raw.formative3,
                    row.raw.mid_term,
                    row.raw.final_term,
                    row.raw_average_formative,
                    row.raw_final,
                    row.curved.formative1,
                    row.curved.formative2,
                    row.curved.formative3,
                    row.curved.mid_term,
                    row.curved.final_term,
                    row.curved_average_formative,
                    row.curved_final,
                    status,
                    row.params.pass_threshold,
                    row.params.target_ceiling,
                    row.range.min_final,
                    row.range.max_final,
                    row.roster_size as i64,
                    row.raw_digest,
                    row.processed_by,
                    row.processed_at,
                ],
            )
            .map_err(|e| upsert_error(&row.student_id, e))?;
        Ok(())
    }

    fn delete_curved(&self, scope: &CurveScope, student_id: &str) -> CurveResult<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM curved_results
                 WHERE student_id = ? AND subject = ? AND class_id = ? AND year = ? AND semester = ?",
                (
                    student_id,
                    &scope.subject,
                    &scope.class_id,
                    &scope.year,
                    &scope.semester,
                ),
            )
            .map_err(CurveError::io(format!("delete curved result for {student_id}")))?;
        Ok(removed > 0)
    }
}

fn upsert_error(student_id: &str, e: rusqlite::Error) -> CurveError {
    match &e {
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
            CurveError::RowRejected {
                student_id: student_id.to_string(),
                message: e.to_string(),
            }
        }
        _ => CurveError::TransientIo {
            context: format!("upsert curved result for {student_id}"),
            source: e,
        },
    }
}

fn curved_from_row(r: &Row<'_>, scope: &CurveScope) -> rusqlite::Result<CurvedResult> {
    let status: Option<String> = r.get(15)?;
    Ok(CurvedResult {
        student_id: r.get(0)?,
        scope: scope.clone(),
        raw: ComponentScores {
            formative1: r.get(1)?,
            formative2: r.get(2)?,
            formative3: r.get(3)?,
            mid_term: r.get(4)?,
            final_term: r.get(5)?,
        },
        raw_average_formative: r.get(6)?,
        raw_final: r.get(7)?,
        curved: ComponentScores {
            formative1: r.get(8)?,
            formative2: r.get(9)?,
            formative3: r.get(10)?,
            mid_term: r.get(11)?,
            final_term: r.get(12)?,
        },
        curved_average_formative: r.get(13)?,
        curved_final: r.get(14)?,
        status: status.as_deref().and_then(PassStatus::parse),
        params: CurveParameters {
            pass_threshold: r.get(16)?,
            target_ceiling: r.get(17)?,
        },
        range: ClassRange {
            min_final: r.get(18)?,
            max_final: r.get(19)?,
        },
        roster_size: r.get::<_, i64>(20)?.max(0) as usize,
        raw_digest: r.get(21)?,
        processed_by: r.get(22)?,
        processed_at: r.get(23)?,
    })
}
