//! Roster seeding. Real roster management lives in the school screens; the
//! sidecar only needs enough to put students into a class/year.

use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{required_str, scalar_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let year = required_str(&req.params, "year")?;
    let display_name = required_str(&req.params, "displayName")?;
    let registration_no = scalar_param(&req.params, "registrationNo")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let student_id = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    conn.execute(
        "INSERT INTO students(id, class_id, year, display_name, registration_no, active, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &student_id,
            &class_id,
            &year,
            &display_name,
            &registration_no,
            active as i64,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    Ok(json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;
    let year = required_str(&req.params, "year")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, display_name, registration_no, active
             FROM students
             WHERE class_id = ? AND year = ?
             ORDER BY display_name, id",
        )
        .map_err(HandlerErr::db)?;
    let students = stmt
        .query_map((&class_id, &year), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "displayName": r.get::<_, String>(1)?,
                "registrationNo": r.get::<_, Option<String>>(2)?,
                "active": r.get::<_, i64>(3)? != 0,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => handle_students_create(state, req),
        "students.list" => handle_students_list(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
