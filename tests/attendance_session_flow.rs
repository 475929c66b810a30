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
    let exe = env!("CARGO_BIN_EXE_upasthtid");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn upasthtid");
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
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
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn summary_field(result: &serde_json::Value, field: &str) -> i64 {
    result
        .get("summary")
        .and_then(|s| s.get(field))
        .and_then(|v| v.as_i64())
        .unwrap_or(-1)
}

#[test]
fn session_mark_save_reopen_flow() {
    let workspace = temp_dir("upasthiti-session-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "classes.create",
        json!({ "name": "Class 10-A Mathematics", "subject": "Mathematics" }),
    );
    let class_id = created
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    let names = ["Niya Sharma", "Pranav", "Paridhi Balodhi", "Nandika Gupta"];
    let mut student_ids = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "classId": class_id,
                "displayName": name,
                "rollNumber": format!("10A{:03}", i + 1)
            }),
        );
        student_ids.push(
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }

    // Fresh session: everyone pending, rate 0, roster in creation order.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "attendance.sessionOpen",
        json!({ "classId": class_id, "date": "2025-09-13" }),
    );
    assert_eq!(summary_field(&opened, "total"), 4);
    assert_eq!(summary_field(&opened, "pending"), 4);
    assert_eq!(summary_field(&opened, "rate"), 0);
    assert_eq!(opened.get("seededFromSaved"), Some(&json!(false)));
    let roster: Vec<&str> = opened
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| s.get("displayName").and_then(|v| v.as_str()).expect("name"))
        .collect();
    assert_eq!(roster, names);

    // Two present, one absent, one left pending => rate 50.
    for (i, (sid, status)) in [
        (&student_ids[0], "present"),
        (&student_ids[1], "present"),
        (&student_ids[2], "absent"),
    ]
    .iter()
    .enumerate()
    {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{}", i),
            "attendance.mark",
            json!({ "studentId": sid, "status": status }),
        );
    }
    let summary = request_ok(&mut stdin, &mut reader, "r4", "attendance.summary", json!({}));
    assert_eq!(summary_field(&summary, "present"), 2);
    assert_eq!(summary_field(&summary, "absent"), 1);
    assert_eq!(summary_field(&summary, "leave"), 0);
    assert_eq!(summary_field(&summary, "pending"), 1);
    assert_eq!(summary_field(&summary, "rate"), 50);

    // Marking outside the roster is rejected and changes nothing.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "r5",
        "attendance.mark",
        json!({ "studentId": "nobody", "status": "present" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("unknown_student"));
    let summary = request_ok(&mut stdin, &mut reader, "r6", "attendance.summary", json!({}));
    assert_eq!(summary_field(&summary, "pending"), 1);
    assert_eq!(summary_field(&summary, "total"), 4);

    // Pending entries hold up a plain save; force pushes it through.
    let error = request_err(&mut stdin, &mut reader, "r7", "attendance.save", json!({}));
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("pending_entries"));
    assert_eq!(
        error.pointer("/details/pending").and_then(|v| v.as_i64()),
        Some(1)
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "r8",
        "attendance.save",
        json!({ "force": true }),
    );
    assert_eq!(saved.get("savedCount").and_then(|v| v.as_i64()), Some(4));

    // markAll resolves everyone; a plain save now goes through.
    let marked = request_ok(
        &mut stdin,
        &mut reader,
        "r9",
        "attendance.markAll",
        json!({ "status": "absent" }),
    );
    assert_eq!(summary_field(&marked, "pending"), 0);
    assert_eq!(summary_field(&marked, "absent"), 4);
    assert_eq!(summary_field(&marked, "rate"), 0);
    request_ok(&mut stdin, &mut reader, "r10", "attendance.save", json!({}));

    // Reopening the same (class, date) seeds from the saved records.
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "r11",
        "attendance.sessionOpen",
        json!({ "classId": class_id, "date": "2025-09-13" }),
    );
    assert_eq!(reopened.get("seededFromSaved"), Some(&json!(true)));
    assert_eq!(summary_field(&reopened, "absent"), 4);
    assert_eq!(summary_field(&reopened, "pending"), 0);

    // A different date is a fresh session again.
    let fresh = request_ok(
        &mut stdin,
        &mut reader,
        "r12",
        "attendance.sessionOpen",
        json!({ "classId": class_id, "date": "2025-09-14" }),
    );
    assert_eq!(fresh.get("seededFromSaved"), Some(&json!(false)));
    assert_eq!(summary_field(&fresh, "pending"), 4);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn session_requires_workspace_and_roster() {
    let workspace = temp_dir("upasthiti-session-guards");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let error = request_err(
        &mut stdin,
        &mut reader,
        "g1",
        "attendance.sessionOpen",
        json!({ "classId": "c", "date": "2025-09-13" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("no_workspace"));

    request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "g3",
        "attendance.mark",
        json!({ "studentId": "s", "status": "present" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("no_session"));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "g4",
        "attendance.sessionOpen",
        json!({ "classId": "missing", "date": "2025-09-13" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("not_found"));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "g5",
        "attendance.sessionOpen",
        json!({ "classId": "missing", "date": "13/09/2025" }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}
