mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{
    error_code, i64_at, request, request_err, request_ok, spawn_sidecar, str_at, temp_dir,
};

#[test]
fn health_and_workspace_gate() {
    let workspace = temp_dir("classpoints-ipc-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let gated = request_err(&mut stdin, &mut reader, "2", "students.list", json!({}));
    assert_eq!(error_code(&gated), "no_workspace");

    let catalog = request_ok(&mut stdin, &mut reader, "2b", "badges.catalog", json!({}));
    assert_eq!(catalog["badges"].as_array().map(|a| a.len()), Some(20));

    let missing_path = request_err(&mut stdin, &mut reader, "3", "workspace.select", json!({}));
    assert_eq!(error_code(&missing_path), "bad_params");

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        str_at(&selected, "/workspacePath"),
        workspace.to_string_lossy()
    );
    assert!(workspace.join("classpoints.sqlite3").is_file());

    let listed = request_ok(&mut stdin, &mut reader, "5", "students.list", json!({}));
    assert_eq!(listed["students"].as_array().map(|a| a.len()), Some(0));

    let unknown = request(&mut stdin, &mut reader, "6", "ledger.teleport", json!({}));
    assert_eq!(unknown["ok"], json!(false));
    assert_eq!(error_code(&unknown["error"]), "not_implemented");
}

#[test]
fn malformed_lines_get_bad_json_and_the_loop_keeps_going() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let health = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
    assert!(health.get("version").is_some());
}

#[test]
fn setup_defaults_and_validated_updates() {
    let workspace = temp_dir("classpoints-ipc-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(i64_at(&setup, "/gamification/attendancePoints"), 10);
    assert_eq!(i64_at(&setup, "/gamification/goalCompletionBonus"), 30);
    assert_eq!(str_at(&setup, "/gamification/leaderboardTieBreak"), "store_order");

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({
            "section": "gamification",
            "patch": { "attendancePoints": 12, "leaderboardTieBreak": "name" }
        }),
    );
    assert_eq!(i64_at(&updated, "/gamification/attendancePoints"), 12);
    assert_eq!(str_at(&updated, "/gamification/leaderboardTieBreak"), "name");

    let rejected = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "patch": { "couponValidityMonths": 0 } }),
    );
    assert_eq!(error_code(&rejected), "bad_params");
    let unknown_field = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "setup.update",
        json!({ "patch": { "confettiLevel": 11 } }),
    );
    assert_eq!(error_code(&unknown_field), "bad_params");

    let reread = request_ok(&mut stdin, &mut reader, "6", "setup.get", json!({}));
    assert_eq!(i64_at(&reread, "/gamification/attendancePoints"), 12);
    assert_eq!(i64_at(&reread, "/gamification/couponValidityMonths"), 1);
}

#[test]
fn parameter_and_domain_errors_map_to_codes() {
    let workspace = temp_dir("classpoints-ipc-errors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "name": "Jiwoo" }),
    );
    let student_id = str_at(&created, "/student/id").to_string();

    let no_amount = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "ledger.award",
        json!({ "studentId": student_id, "source": "admin" }),
    );
    assert_eq!(error_code(&no_amount), "bad_params");

    let bad_source = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "ledger.award",
        json!({ "studentId": student_id, "amount": 5, "source": "lottery" }),
    );
    assert_eq!(error_code(&bad_source), "bad_params");

    let ghost = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "ledger.balance",
        json!({ "studentId": "ghost" }),
    );
    assert_eq!(error_code(&ghost), "not_found");

    let overspend = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "ledger.charge",
        json!({ "studentId": student_id, "amount": 3, "source": "shop" }),
    );
    assert_eq!(error_code(&overspend), "insufficient_balance");
    assert_eq!(i64_at(&overspend, "/details/balance"), 0);
    assert_eq!(i64_at(&overspend, "/details/required"), 3);

    let bad_now = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "ledger.award",
        json!({ "studentId": student_id, "amount": 5, "source": "admin", "now": "yesterday" }),
    );
    assert_eq!(error_code(&bad_now), "bad_params");
}
