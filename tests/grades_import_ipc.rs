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
    let exe = env!("CARGO_BIN_EXE_gradesheetd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradesheetd");
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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
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
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn student_names(result: &serde_json::Value) -> Vec<(String, u64)> {
    result["students"]
        .as_array()
        .expect("students array")
        .iter()
        .map(|s| {
            (
                s["name"].as_str().expect("name").to_string(),
                s["gradeCount"].as_u64().expect("gradeCount"),
            )
        })
        .collect()
}

#[test]
fn import_overwrite_rank_and_delete_flow() {
    let workspace = temp_dir("gradesheet-import-flow");
    let sheet = workspace.join("期中考试.csv");
    std::fs::write(&sheet, "姓名,语文,数学\nAlice,90,80\nBob,85,95\n").expect("write sheet");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.importSheet",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(imported["examName"], "期中考试");
    assert_eq!(imported["semester"], "2024-2025-1");
    assert_eq!(imported["overwritten"], false);
    assert_eq!(imported["updatedCount"], 2);
    assert_eq!(imported["recalculatedTotals"], true);
    assert_eq!(imported["notice"]["kind"], "success");
    assert!(imported["notice"]["message"]
        .as_str()
        .expect("notice message")
        .starts_with("导入成功"));
    let exam_id = imported["examId"].as_str().expect("examId").to_string();

    let results = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "exams.results",
        json!({ "examId": exam_id }),
    );
    let rows = results["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["studentName"], "Bob");
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[0]["totalScore"].as_f64(), Some(180.0));
    assert_eq!(rows[1]["studentName"], "Alice");
    assert_eq!(rows[1]["rank"], 2);
    assert_eq!(rows[1]["totalScore"].as_f64(), Some(170.0));

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "exams.subjects",
        json!({ "examId": exam_id }),
    );
    assert_eq!(subjects["subjects"], json!(["语文", "数学"]));

    // Same name and semester without consent is refused and changes nothing.
    let declined = request(
        &mut stdin,
        &mut reader,
        "5",
        "grades.importSheet",
        json!({ "path": sheet.to_string_lossy() }),
    );
    assert_eq!(error_code(&declined), Some("exam_exists"));
    assert_eq!(declined["error"]["details"]["examId"], exam_id.as_str());

    std::fs::write(&sheet, "姓名,语文,数学\nAlice,100,99\nBob,85,95\n").expect("rewrite sheet");
    let overwritten = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.importSheet",
        json!({ "path": sheet.to_string_lossy(), "overwrite": true }),
    );
    assert_eq!(overwritten["overwritten"], true);
    assert_eq!(overwritten["examId"], exam_id.as_str());
    assert!(overwritten["notice"]["message"]
        .as_str()
        .expect("notice message")
        .starts_with("覆盖成功"));

    let listed = request_ok(&mut stdin, &mut reader, "7", "students.list", json!({}));
    assert_eq!(
        student_names(&listed),
        vec![("Alice".to_string(), 1), ("Bob".to_string(), 1)]
    );

    let exams = request_ok(&mut stdin, &mut reader, "8", "exams.list", json!({}));
    assert_eq!(exams["exams"].as_array().expect("exams").len(), 1);

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "exams.subjectRanking",
        json!({ "examId": exam_id, "subject": "数学" }),
    );
    let rows = ranking["rows"].as_array().expect("rows");
    assert_eq!(rows[0]["studentName"], "Alice");
    assert_eq!(rows[0]["rank"], 1);
    assert_eq!(rows[0]["score"].as_f64(), Some(99.0));
    assert_eq!(rows[1]["studentName"], "Bob");
    assert_eq!(rows[1]["rank"], 2);

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "exams.delete",
        json!({ "examId": exam_id }),
    );
    assert_eq!(deleted["studentsUpdated"], 2);
    let exams = request_ok(&mut stdin, &mut reader, "11", "exams.list", json!({}));
    assert!(exams["exams"].as_array().expect("exams").is_empty());
    let listed = request_ok(&mut stdin, &mut reader, "12", "students.list", json!({}));
    assert_eq!(
        student_names(&listed),
        vec![("Alice".to_string(), 0), ("Bob".to_string(), 0)]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn import_failures_surface_as_import_failed() {
    let workspace = temp_dir("gradesheet-import-errors");
    let one_row = workspace.join("header-only.csv");
    std::fs::write(&one_row, "姓名,语文\n").expect("write sheet");
    let no_name = workspace.join("no-name.csv");
    std::fs::write(&no_name, "学号,语文\n1,90\n").expect("write sheet");
    let wrong_type = workspace.join("grades.txt");
    std::fs::write(&wrong_type, "姓名,语文\nAlice,90\n").expect("write sheet");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    for (i, path) in [&one_row, &no_name, &wrong_type].iter().enumerate() {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("e{i}"),
            "grades.importSheet",
            json!({ "path": path.to_string_lossy() }),
        );
        assert_eq!(error_code(&resp), Some("import_failed"), "{}", resp);
    }
    let missing = request(&mut stdin, &mut reader, "m", "grades.importSheet", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));

    let exams = request_ok(&mut stdin, &mut reader, "x", "exams.list", json!({}));
    assert!(exams["exams"].as_array().expect("exams").is_empty());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn explicit_semester_exam_name_and_id_matching() {
    let workspace = temp_dir("gradesheet-import-options");
    let first = workspace.join("a.csv");
    std::fs::write(&first, "学号,姓名,语文\n2024001,Alice,90\n").expect("write");
    let second = workspace.join("b.csv");
    std::fs::write(&second, "学号,姓名,语文\n2024001,Alicia,95\n").expect("write");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.settings.set",
        json!({ "studentMatch": "byIdThenName" }),
    );
    let settings = request_ok(&mut stdin, &mut reader, "3", "import.settings.get", json!({}));
    assert_eq!(settings["studentMatch"], "byIdThenName");
    assert_eq!(settings["headerVocabulary"]["name"], json!(["姓名"]));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.importSheet",
        json!({
            "path": first.to_string_lossy(),
            "semester": "2025-2026-1",
            "examName": "月考一",
        }),
    );
    assert_eq!(imported["examName"], "月考一");
    assert_eq!(imported["semester"], "2025-2026-1");
    assert_eq!(imported["createdStudents"], 1);

    // Renamed in the second sheet but matched through the sheet id.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "grades.importSheet",
        json!({
            "path": second.to_string_lossy(),
            "semester": "2025-2026-1",
        }),
    );
    assert_eq!(again["examName"], "b");
    assert_eq!(again["createdStudents"], 0);

    let listed = request_ok(&mut stdin, &mut reader, "6", "students.list", json!({}));
    assert_eq!(
        student_names(&listed),
        vec![("Alice".to_string(), 2)]
    );
    assert_eq!(listed["students"][0]["id"], "2024001");

    let default_semester = request_ok(&mut stdin, &mut reader, "7", "exams.list", json!({}));
    assert!(default_semester["exams"].as_array().expect("exams").is_empty());
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "exams.list",
        json!({ "semester": "2025-2026-1" }),
    );
    assert_eq!(other["exams"].as_array().expect("exams").len(), 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
