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

#[test]
fn stale_pending_fee_reports_as_overdue_until_swept() {
    let workspace = temp_dir("nurseryd-reports-financial");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.create",
        json!({ "tenantId": "t1", "fullName": "Ava Chen" }),
    );
    let sid = student["student"]["id"].clone();

    for (i, (amount, due)) in [("300", "2024-05-01"), ("120", "2024-06-01")].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("fee{}", i),
            "fees.create",
            json!({
                "tenantId": "t1",
                "studentId": sid,
                "amount": amount,
                "feeType": "tuition",
                "dueDate": due
            }),
        );
    }
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "transactions.record",
        json!({
            "tenantId": "t1",
            "type": "expense",
            "category": "supplies",
            "amount": "45",
            "date": "2024-05-03"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "transactions.record",
        json!({
            "tenantId": "t1",
            "type": "income",
            "category": "donations",
            "amount": "60",
            "date": "2024-04-20"
        }),
    );

    let window = json!({
        "tenantId": "t1",
        "from": "2024-05-01",
        "to": "2024-05-31",
        "today": "2024-05-15"
    });
    let report = request_ok(&mut stdin, &mut reader, "5", "reports.financial", window.clone());
    let stats = &report["stats"];
    assert_eq!(stats["overdueFees"].as_str(), Some("300"));
    assert_eq!(stats["pendingFees"].as_str(), Some("120"));
    assert_eq!(stats["totalIncome"].as_str(), Some("60"));
    assert_eq!(stats["monthlyIncome"].as_str(), Some("0"));
    assert_eq!(stats["totalExpenses"].as_str(), Some("45"));
    assert_eq!(stats["monthlyExpenses"].as_str(), Some("45"));

    // Reading did not rewrite the stored status.
    let pending = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.list",
        json!({ "tenantId": "t1", "status": "pending", "today": "2024-05-15" }),
    );
    let rows = pending["fees"].as_array().expect("fees");
    assert_eq!(rows.len(), 2);
    let stale = rows
        .iter()
        .find(|r| r["fee"]["amount"].as_str() == Some("300"))
        .expect("stale fee");
    assert_eq!(stale["effectiveStatus"].as_str(), Some("overdue"));

    let swept = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.refreshOverdue",
        json!({ "tenantId": "t1", "today": "2024-05-15" }),
    );
    assert_eq!(swept["updated"].as_u64(), Some(1));
    let overdue = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.list",
        json!({ "tenantId": "t1", "status": "overdue" }),
    );
    assert_eq!(overdue["fees"].as_array().map(|a| a.len()), Some(1));

    let report = request_ok(&mut stdin, &mut reader, "9", "reports.financial", window);
    assert_eq!(report["stats"]["overdueFees"].as_str(), Some("300"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn dashboard_rolls_up_attendance_occupancy_money_and_rewards() {
    let workspace = temp_dir("nurseryd-reports-dashboard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "tenantId": "t1", "name": "Bumblebees", "capacity": 8 }),
    );
    let class_id = class["class"]["id"].as_str().expect("class id").to_string();
    let mut ids = Vec::new();
    for name in ["Ada", "Ben", "Cleo", "Dev"] {
        let s = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s-{}", name),
            "students.create",
            json!({ "tenantId": "t1", "fullName": name, "classId": class_id }),
        );
        ids.push(s["student"]["id"].as_str().expect("id").to_string());
    }

    let marks = [
        (0, "2024-05-06", "present"),
        (1, "2024-05-06", "late"),
        (2, "2024-05-06", "absent"),
        (3, "2024-05-06", "excused"),
        (0, "2024-05-07", "present"),
        (1, "2024-05-07", "present"),
        (2, "2024-05-07", "present"),
        (3, "2024-05-07", "absent"),
    ];
    for (i, (who, date, status)) in marks.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("mark{}", i),
            "attendance.mark",
            json!({ "tenantId": "t1", "studentId": ids[*who], "date": date, "status": status }),
        );
    }

    // Cleo and Dev tie on points; Dev earned first, so Dev ranks higher.
    let awards = [(3, 4), (2, 3), (0, 9), (2, 1)];
    for (i, (who, points)) in awards.iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("award{}", i),
            "rewards.award",
            json!({ "tenantId": "t1", "studentId": ids[*who], "points": points, "reason": "helping" }),
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let zero = request(
        &mut stdin,
        &mut reader,
        "award-zero",
        "rewards.award",
        json!({ "tenantId": "t1", "studentId": ids[1], "points": 0 }),
    );
    assert_eq!(error_code(&zero), "bad_params");

    let dash = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.dashboard",
        json!({
            "tenantId": "t1",
            "classId": class_id,
            "from": "2024-05-01",
            "to": "2100-12-31",
            "today": "2024-05-08",
            "topN": 3
        }),
    );
    assert_eq!(dash["totalStudents"].as_u64(), Some(4));
    assert_eq!(dash["totalCapacity"].as_u64(), Some(8));
    assert_eq!(dash["occupancyRate"].as_u64(), Some(50));
    // 5 on-site marks over 4 students x 2 days.
    assert_eq!(dash["attendance"]["rate"].as_u64(), Some(63));
    let daily = dash["dailyAttendance"].as_array().expect("daily");
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0]["rate"].as_u64(), Some(50));
    assert_eq!(daily[1]["rate"].as_u64(), Some(75));

    let top = dash["topPerformers"].as_array().expect("top");
    let order: Vec<&str> = top.iter().filter_map(|r| r["fullName"].as_str()).collect();
    assert_eq!(order, vec!["Ada", "Dev", "Cleo"]);
    assert_eq!(top[1]["points"].as_i64(), Some(4));
    assert_eq!(top[2]["points"].as_i64(), Some(4));

    drop(stdin);
    let _ = child.wait();
}
