mod test_support;

use serde_json::json;
use test_support::{
    pair_curved, request_ok, row_for, scoped, seed_student, spawn_sidecar, temp_dir,
};

fn curve_params() -> serde_json::Value {
    scoped(json!({ "passThreshold": 75, "targetCeiling": 100 }))
}

#[test]
fn compute_save_then_reload_reuses_the_snapshot() {
    let workspace = temp_dir("katrol-curve-flow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_student(&mut stdin, &mut reader, "2", "s-andi", "Andi", Some(50.0));
    seed_student(&mut stdin, &mut reader, "3", "s-budi", "Budi", Some(60.0));
    seed_student(&mut stdin, &mut reader, "4", "s-citra", "Citra", Some(90.0));

    let computed = request_ok(&mut stdin, &mut reader, "5", "curve.load", curve_params());
    assert_eq!(computed.get("state").and_then(|v| v.as_str()), Some("computed"));
    assert_eq!(computed.get("reused").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        computed.pointer("/preview/range/minFinal").and_then(|v| v.as_f64()),
        Some(50.0)
    );
    assert_eq!(
        computed.pointer("/preview/range/maxFinal").and_then(|v| v.as_f64()),
        Some(90.0)
    );

    let budi = row_for(&computed, "s-budi");
    assert_eq!(pair_curved(budi, "midTerm"), Some(81.3));
    assert_eq!(budi.get("curvedFinal").and_then(|v| v.as_f64()), Some(81.3));
    assert_eq!(budi.get("status").and_then(|v| v.as_str()), Some("Tuntas"));
    // The class minimum lands exactly on the threshold.
    let andi = row_for(&computed, "s-andi");
    assert_eq!(andi.get("curvedFinal").and_then(|v| v.as_f64()), Some(75.0));
    let citra = row_for(&computed, "s-citra");
    assert_eq!(pair_curved(citra, "finalTerm"), Some(90.0));
    assert_eq!(
        citra
            .pointer("/pairs/4/changed")
            .and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(computed.pointer("/summary/passed").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(computed.pointer("/summary/curved").and_then(|v| v.as_u64()), Some(2));

    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "curve.save",
        scoped(json!({ "operator": "bu.sari" })),
    );
    assert_eq!(saved.get("state").and_then(|v| v.as_str()), Some("saved"));
    assert_eq!(saved.pointer("/counts/saved").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(saved.pointer("/counts/failed").and_then(|v| v.as_u64()), Some(0));

    // Raw edits after saving do not move the frozen snapshot.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "scores.upsert",
        scoped(json!({ "edits": [{ "studentId": "s-budi", "component": "midTerm", "value": 95 }] })),
    );
    let reloaded = request_ok(&mut stdin, &mut reader, "8", "curve.load", curve_params());
    assert_eq!(reloaded.get("state").and_then(|v| v.as_str()), Some("loaded"));
    assert_eq!(reloaded.get("reused").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        reloaded.get("rawChangedSinceCurve").and_then(|v| v.as_bool()),
        Some(true)
    );
    let budi = row_for(&reloaded, "s-budi");
    assert_eq!(pair_curved(budi, "midTerm"), Some(81.3));
    assert_eq!(budi.get("curvedFinal").and_then(|v| v.as_f64()), Some(81.3));
    assert_eq!(
        reloaded
            .pointer("/preview/rows/0/student/displayName")
            .and_then(|v| v.as_str()),
        Some("Andi")
    );

    let listed = request_ok(&mut stdin, &mut reader, "9", "curve.list", json!({ "classId": "7A" }));
    let snapshots = listed
        .get("snapshots")
        .and_then(|v| v.as_array())
        .expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].get("rows").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(
        snapshots[0].get("processedBy").and_then(|v| v.as_str()),
        Some("bu.sari")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn forced_recompute_overwrites_on_the_natural_key() {
    let workspace = temp_dir("katrol-curve-recompute");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    seed_student(&mut stdin, &mut reader, "2", "s-andi", "Andi", Some(50.0));
    seed_student(&mut stdin, &mut reader, "3", "s-budi", "Budi", Some(60.0));
    seed_student(&mut stdin, &mut reader, "4", "s-citra", "Citra", Some(90.0));

    let _ = request_ok(&mut stdin, &mut reader, "5", "curve.load", curve_params());
    let _ = request_ok(&mut stdin, &mut reader, "6", "curve.save", scoped(json!({})));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "scores.upsert",
        scoped(json!({ "edits": [
            { "studentId": "s-andi", "component": "formative1", "value": 30 },
            { "studentId": "s-andi", "component": "formative2", "value": 30 },
            { "studentId": "s-andi", "component": "formative3", "value": 30 },
            { "studentId": "s-andi", "component": "midTerm", "value": 30 },
            { "studentId": "s-andi", "component": "finalTerm", "value": 30 }
        ] })),
    );

    let recomputed = request_ok(&mut stdin, &mut reader, "8", "curve.recompute", curve_params());
    assert_eq!(recomputed.get("state").and_then(|v| v.as_str()), Some("computed"));
    assert_eq!(recomputed.get("reused").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        recomputed.pointer("/preview/range/minFinal").and_then(|v| v.as_f64()),
        Some(30.0)
    );
    // 75 + (30/60)*25
    let budi = row_for(&recomputed, "s-budi");
    assert_eq!(budi.get("curvedFinal").and_then(|v| v.as_f64()), Some(87.5));

    let saved = request_ok(&mut stdin, &mut reader, "9", "curve.save", scoped(json!({})));
    assert_eq!(saved.pointer("/counts/saved").and_then(|v| v.as_u64()), Some(3));

    let listed = request_ok(&mut stdin, &mut reader, "10", "curve.list", json!({ "classId": "7A" }));
    assert_eq!(
        listed.pointer("/snapshots/0/rows").and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(
        listed.pointer("/snapshots/0/processedBy").and_then(|v| v.as_str()),
        Some("wali-kelas")
    );

    let reloaded = request_ok(&mut stdin, &mut reader, "11", "curve.load", curve_params());
    assert_eq!(reloaded.get("state").and_then(|v| v.as_str()), Some("loaded"));
    assert_eq!(
        reloaded.get("rawChangedSinceCurve").and_then(|v| v.as_bool()),
        Some(false)
    );
    let budi = row_for(&reloaded, "s-budi");
    assert_eq!(budi.get("curvedFinal").and_then(|v| v.as_f64()), Some(87.5));

    let _ = std::fs::remove_dir_all(workspace);
}
