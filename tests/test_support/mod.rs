#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_katrold");
    let mut child = Command::new(exe)
        .env_remove("KATROL_WORKSPACE")
        .env("KATROL_OPERATOR", "wali-kelas")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn katrold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

pub fn scope() -> serde_json::Value {
    json!({
        "classId": "7A",
        "subject": "MTK",
        "year": "2024/2025",
        "semester": "1"
    })
}

/// `scope()` with extra keys merged in.
pub fn scoped(extra: serde_json::Value) -> serde_json::Value {
    let mut params = scope();
    if let (Some(target), Some(source)) = (params.as_object_mut(), extra.as_object()) {
        for (k, v) in source {
            target.insert(k.clone(), v.clone());
        }
    }
    params
}

/// Enrols a student into class 7A and gives every component the same raw
/// score. `None` leaves the student without scores.
pub fn seed_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
    display_name: &str,
    score: Option<f64>,
) {
    let _ = request_ok(
        stdin,
        reader,
        &format!("{id}-student"),
        "students.create",
        json!({
            "studentId": student_id,
            "classId": "7A",
            "year": "2024/2025",
            "displayName": display_name
        }),
    );
    let Some(score) = score else {
        return;
    };
    let edits: Vec<serde_json::Value> = ["formative1", "formative2", "formative3", "midTerm", "finalTerm"]
        .iter()
        .map(|c| json!({ "studentId": student_id, "component": c, "value": score }))
        .collect();
    let res = request_ok(
        stdin,
        reader,
        &format!("{id}-scores"),
        "scores.upsert",
        scoped(json!({ "edits": edits })),
    );
    assert_eq!(res.get("updated").and_then(|v| v.as_u64()), Some(5));
}

pub fn row_for<'a>(result: &'a serde_json::Value, student_id: &str) -> &'a serde_json::Value {
    result
        .get("rows")
        .and_then(|v| v.as_array())
        .and_then(|rows| {
            rows.iter()
                .find(|r| r.get("studentId").and_then(|v| v.as_str()) == Some(student_id))
        })
        .unwrap_or_else(|| panic!("no row for {student_id} in {result}"))
}

pub fn pair_curved(row: &serde_json::Value, component: &str) -> Option<f64> {
    row.get("pairs")
        .and_then(|v| v.as_array())
        .and_then(|pairs| {
            pairs
                .iter()
                .find(|p| p.get("component").and_then(|v| v.as_str()) == Some(component))
        })
        .and_then(|p| p.get("curved"))
        .and_then(|v| v.as_f64())
}
