use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_nurseryd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn nurseryd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_default()
}

fn error_code(resp: &serde_json::Value) -> &str {
    resp.pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn spawn_sidecar_with_env(vars: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_nurseryd");
    let mut cmd = Command::new(exe);
    for (k, v) in vars {
        cmd.env(k, v);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn nurseryd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn seed_fee(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
    due_date: &str,
) -> (String, serde_json::Value) {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "open",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student = request_ok(
        stdin,
        reader,
        "student",
        "students.create",
        json!({ "tenantId": "t1", "fullName": "Omar Reyes" }),
    );
    let fee = request_ok(
        stdin,
        reader,
        "fee",
        "fees.create",
        json!({
            "tenantId": "t1",
            "studentId": student["student"]["id"],
            "amount": "320",
            "discount": "20",
            "feeType": "meals",
            "dueDate": due_date
        }),
    );
    let fee_id = fee["fee"]["id"].as_str().expect("fee id").to_string();
    (fee_id, fee["fee"].clone())
}

#[test]
fn reminder_reports_delivery_to_the_caller() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (fee_id, _) = seed_fee(&mut stdin, &mut reader, "nurseryd-reminder-ok", "2020-01-10");

    let sent = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "fees.sendReminder",
        json!({ "tenantId": "t1", "feeId": fee_id }),
    );
    assert_eq!(sent["delivery"]["delivered"].as_bool(), Some(true));
    assert_eq!(sent["feeId"].as_str(), Some(fee_id.as_str()));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "fees.markPaid",
        json!({ "tenantId": "t1", "feeId": fee_id }),
    );
    let paid = request(
        &mut stdin,
        &mut reader,
        "3",
        "fees.sendReminder",
        json!({ "tenantId": "t1", "feeId": fee_id }),
    );
    assert_eq!(error_code(&paid), "conflict");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn failed_reminder_is_surfaced_and_leaves_the_fee_untouched() {
    let (mut child, mut stdin, mut reader) =
        spawn_sidecar_with_env(&[("NURSERYD__NOTIFICATIONS__MODE", "disabled")]);
    let (fee_id, before) = seed_fee(&mut stdin, &mut reader, "nurseryd-reminder-fail", "2099-01-10");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "fees.sendReminder",
        json!({ "tenantId": "t1", "feeId": fee_id }),
    );
    assert_eq!(error_code(&resp), "notify_failed");
    assert_eq!(
        resp.pointer("/error/details/dependency").and_then(|v| v.as_str()),
        Some("notifier")
    );

    let fees = request_ok(&mut stdin, &mut reader, "2", "fees.list", json!({ "tenantId": "t1" }));
    let rows = fees["fees"].as_array().expect("fees");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["fee"], before);
    assert!(rows[0]["settlement"].is_null());

    // Attendance notifications fail quietly in the background; the mark still lands.
    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "attendance.mark",
        json!({
            "tenantId": "t1",
            "studentId": before["studentId"],
            "date": "2024-09-02",
            "status": "present"
        }),
    );
    assert_eq!(marked["event"]["status"].as_str(), Some("present"));

    drop(stdin);
    let _ = child.wait();
}
