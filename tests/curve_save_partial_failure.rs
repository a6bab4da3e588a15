mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, scoped, seed_student, spawn_sidecar, temp_dir};

fn curve_params() -> serde_json::Value {
    scoped(json!({ "passThreshold": 75, "targetCeiling": 100 }))
}

fn failed_ids(result: &serde_json::Value) -> Vec<String> {
    result
        .pointer("/counts/failedStudentIds")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn one_rejected_row_does_not_block_the_rest() {
    let workspace = temp_dir("katrol-partial-save");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    for i in 1..=10 {
        let student_id = format!("s{:02}", i);
        let name = format!("Siswa {:02}", i);
        // s07 carries an out-of-range final that the store refuses.
        let score = if i == 7 { 120.0 } else { 40.0 + 5.0 * i as f64 };
        seed_student(
            &mut stdin,
            &mut reader,
            &format!("seed-{i}"),
            &student_id,
            &name,
            Some(score),
        );
    }

    let computed = request_ok(&mut stdin, &mut reader, "2", "curve.load", curve_params());
    assert_eq!(computed.get("state").and_then(|v| v.as_str()), Some("computed"));
    assert_eq!(
        computed.pointer("/summary/eligible").and_then(|v| v.as_u64()),
        Some(10)
    );

    // Subset saves are only for retrying a failed save.
    let subset_first = request(
        &mut stdin,
        &mut reader,
        "3",
        "curve.save",
        scoped(json!({ "studentIds": ["s01"] })),
    );
    assert_eq!(error_code(&subset_first), Some("config_error"));

    let first = request_ok(&mut stdin, &mut reader, "4", "curve.save", scoped(json!({})));
    assert_eq!(first.get("state").and_then(|v| v.as_str()), Some("saveFailed"));
    assert_eq!(first.pointer("/counts/saved").and_then(|v| v.as_u64()), Some(9));
    assert_eq!(first.pointer("/counts/failed").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(failed_ids(&first), vec!["s07".to_string()]);

    let listed = request_ok(&mut stdin, &mut reader, "5", "curve.list", json!({ "classId": "7A" }));
    assert_eq!(
        listed.pointer("/snapshots/0/rows").and_then(|v| v.as_i64()),
        Some(9)
    );

    // Retrying only the failed student keeps the other nine outcomes.
    let retry = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "curve.save",
        scoped(json!({ "studentIds": ["s07"] })),
    );
    assert_eq!(retry.get("state").and_then(|v| v.as_str()), Some("saveFailed"));
    assert_eq!(retry.pointer("/counts/saved").and_then(|v| v.as_u64()), Some(9));
    assert_eq!(failed_ids(&retry), vec!["s07".to_string()]);
    let outcomes = retry
        .get("outcomes")
        .and_then(|v| v.as_array())
        .expect("outcomes");
    assert_eq!(outcomes.len(), 10);
    let s07 = outcomes
        .iter()
        .find(|o| o.get("studentId").and_then(|v| v.as_str()) == Some("s07"))
        .expect("s07 outcome");
    assert_eq!(s07.get("outcome").and_then(|v| v.as_str()), Some("failed"));
    assert!(s07
        .get("error")
        .and_then(|v| v.as_str())
        .map(|s| !s.is_empty())
        .unwrap_or(false));

    let _ = std::fs::remove_dir_all(workspace);
}
