use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{parse_curve_params, parse_scope, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::CurveScope;
use crate::present::{present_rows, summarize, summarize_outcomes};
use crate::repo::SqliteRepository;
use crate::session::{CurveSession, SaveMeta, SessionState};
use serde_json::json;
use std::collections::HashSet;

fn state_payload(scope: &CurveScope, state: &SessionState) -> serde_json::Value {
    let mut out = json!({
        "scope": scope,
        "state": state.name(),
    });
    if let SessionState::NothingToCurve { roster_size } = state {
        out["rosterSize"] = json!(roster_size);
    }
    if let Some(preview) = state.preview() {
        out["reused"] = json!(preview.is_reused());
        out["rawChangedSinceCurve"] = json!(preview.raw_changed_since_curve);
        out["preview"] = json!(preview);
        out["rows"] = json!(present_rows(preview));
        out["summary"] = json!(summarize(preview));
    }
    if let Some(outcomes) = state.outcomes() {
        out["outcomes"] = json!(outcomes);
        out["counts"] = json!(summarize_outcomes(outcomes));
    }
    out
}

/// Load or compute. `force` skips the existing-curve check.
fn handle_curve_load(
    state: &mut AppState,
    req: &Request,
    force: bool,
) -> Result<serde_json::Value, HandlerErr> {
    let scope = parse_scope(&req.params)?;
    let params = parse_curve_params(&req.params)?;
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let repo = SqliteRepository::new(conn);

    let session = match state.sessions.entry(scope.clone()) {
        std::collections::hash_map::Entry::Occupied(e) => {
            let session = e.into_mut();
            session.set_params(params)?;
            session
        }
        std::collections::hash_map::Entry::Vacant(e) => {
            e.insert(CurveSession::new(scope.clone(), params)?)
        }
    };

    let next = if force {
        session.force_recompute(&repo)?
    } else {
        session.request_load(&repo)?
    };
    Ok(state_payload(&scope, next))
}

fn handle_curve_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let scope = parse_scope(&req.params)?;
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let repo = SqliteRepository::new(conn);

    let operator = match req.params.get("operator") {
        Some(_) => required_str(&req.params, "operator")?,
        None => state.config.default_operator.clone(),
    };
    let only: Option<HashSet<String>> = match req.params.get("studentIds") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(arr) = v.as_array() else {
                return Err(HandlerErr::bad_params("studentIds must be an array"));
            };
            let mut ids = HashSet::new();
            for item in arr {
                let Some(s) = item.as_str() else {
                    return Err(HandlerErr::bad_params("studentIds must contain strings"));
                };
                ids.insert(s.to_string());
            }
            Some(ids)
        }
    };

    let Some(session) = state.sessions.get_mut(&scope) else {
        return Err(HandlerErr {
            code: "bad_state",
            message: "no curve computed for this scope; call curve.load first".to_string(),
            details: Some(json!({ "scope": scope })),
        });
    };
    session.confirm_save(&repo, &SaveMeta::now(operator), only.as_ref())?;
    Ok(state_payload(&scope, session.state()))
}

fn handle_curve_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.db.as_ref().ok_or_else(HandlerErr::no_workspace)?;
    let class_id = required_str(&req.params, "classId")?;

    // Bare processed_by takes its value from the row holding MAX(processed_at).
    let mut stmt = conn
        .prepare(
            "SELECT subject, year, semester, COUNT(*), MAX(processed_at), processed_by
             FROM curved_results
             WHERE class_id = ?
             GROUP BY subject, year, semester
             ORDER BY year, semester, subject",
        )
        .map_err(HandlerErr::db)?;
    let snapshots = stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "subject": r.get::<_, String>(0)?,
                "year": r.get::<_, String>(1)?,
                "semester": r.get::<_, String>(2)?,
                "rows": r.get::<_, i64>(3)?,
                "processedAt": r.get::<_, String>(4)?,
                "processedBy": r.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({ "classId": class_id, "snapshots": snapshots }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "curve.load" => handle_curve_load(state, req, false),
        "curve.recompute" => handle_curve_load(state, req, true),
        "curve.save" => handle_curve_save(state, req),
        "curve.list" => handle_curve_list(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
