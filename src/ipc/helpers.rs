use crate::ipc::error::HandlerErr;
use crate::model::{CurveParameters, CurveScope};
use serde_json::Value;

/// Strings, or integers for fields the UI may send as numbers (year, semester).
pub fn scalar_param(params: &Value, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => n.as_i64().map(|v| v.to_string()),
        _ => None,
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    scalar_param(params, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn parse_scope(params: &Value) -> Result<CurveScope, HandlerErr> {
    let get = |k: &str| scalar_param(params, k).unwrap_or_default();
    Ok(CurveScope::new(
        get("classId"),
        get("subject"),
        get("year"),
        get("semester"),
    )?)
}

pub fn parse_curve_params(params: &Value) -> Result<CurveParameters, HandlerErr> {
    let number = |key: &str| {
        params
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| HandlerErr::bad_params(format!("missing numeric {}", key)))
    };
    let threshold = number("passThreshold")?;
    let ceiling = number("targetCeiling")?;
    Ok(CurveParameters::new(threshold, ceiling)?)
}
