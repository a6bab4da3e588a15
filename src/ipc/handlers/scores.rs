//! Raw score entry. Stands in for the grade-entry screens; the curving engine
//! itself never writes here.

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{parse_scope, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Component;
use serde_json::json;
use uuid::Uuid;

const SCORES_UPSERT_MAX_EDITS: usize = 5000;

fn handle_scores_upsert(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let scope = parse_scope(&req.params)?;
    let Some(edits) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing edits"));
    };
    if edits.len() > SCORES_UPSERT_MAX_EDITS {
        return Err(HandlerErr {
            code: "bad_params",
            message: "too many edits".to_string(),
            details: Some(json!({ "count": edits.len(), "max": SCORES_UPSERT_MAX_EDITS })),
        });
    }

    // Validate the whole batch before writing anything.
    let mut parsed: Vec<(String, Component, Option<f64>)> = Vec::with_capacity(edits.len());
    for (i, edit) in edits.iter().enumerate() {
        let student_id = required_str(edit, "studentId")?;
        let component_raw = required_str(edit, "component")?;
        let Some(component) = Component::parse(&component_raw) else {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("unknown component {}", component_raw),
                details: Some(json!({ "index": i })),
            });
        };
        let value = match edit.get("value") {
            None => None,
            Some(v) if v.is_null() => None,
            Some(v) => match v.as_f64() {
                Some(n) if n.is_finite() && n >= 0.0 => Some(n),
                _ => {
                    return Err(HandlerErr {
                        code: "bad_params",
                        message: "value must be a non-negative number or null".to_string(),
                        details: Some(json!({ "index": i })),
                    })
                }
            },
        };
        parsed.push((student_id, component, value));
    }

    let mut updated = 0usize;
    let mut cleared = 0usize;
    for (student_id, component, value) in parsed {
        match value {
            Some(v) => {
                conn.execute(
                    "INSERT INTO assessment_scores(id, student_id, class_id, subject, year, semester, component, value, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
                     ON CONFLICT(student_id, class_id, subject, year, semester, component) DO UPDATE SET
                       value = excluded.value,
                       updated_at = excluded.updated_at",
                    (
                        Uuid::new_v4().to_string(),
                        &student_id,
                        &scope.class_id,
                        &scope.subject,
                        &scope.year,
                        &scope.semester,
                        component.as_str(),
                        v,
                    ),
                )
                .map_err(|e| HandlerErr {
                    code: "db_insert_failed",
                    message: e.to_string(),
                    details: Some(json!({ "table": "assessment_scores", "studentId": student_id })),
                })?;
                updated += 1;
            }
            // An absent component is a missing row, never a null value.
            None => {
                cleared += conn
                    .execute(
                        "DELETE FROM assessment_scores
                         WHERE student_id = ? AND class_id = ? AND subject = ? AND year = ?
                           AND semester = ? AND component = ?",
                        (
                            &student_id,
                            &scope.class_id,
                            &scope.subject,
                            &scope.year,
                            &scope.semester,
                            component.as_str(),
                        ),
                    )
                    .map_err(HandlerErr::db)?;
            }
        }
    }

    Ok(json!({ "updated": updated, "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "scores.upsert" => Some(match handle_scores_upsert(state, req) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
