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
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(envs: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_reportcardd");
    let mut cmd = Command::new(exe);
    // Keep the developer's .env and log settings out of the tests.
    cmd.env_remove("REPORTCARDD_WORKSPACE")
        .env_remove("REPORTCARDD_LOG")
        .env_remove("REPORTCARDD_LOG_JSON");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd
        .current_dir(std::env::temp_dir())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn reportcardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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
    send(stdin, reader, id, payload)
}

/// Like `request`, with the caller on the envelope instead of in `params`.
pub fn request_as(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    actor: serde_json::Value,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "actor": actor,
        "params": params,
    });
    send(stdin, reader, id, payload)
}

fn send(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    payload: serde_json::Value,
) -> serde_json::Value {
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_response(reader);
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
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(json!({}))
}

/// Returns the `error` object of a failed response.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

pub fn error_code(error: &serde_json::Value) -> &str {
    error.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

pub fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
}

pub const YEAR: &str = "2024-2025";
pub const SCHOOL: &str = "school-1";

/// A class with the usual eight subjects (Science split into Physics and
/// Biology teachers) and `students` students. Returns the class id and the
/// student ids in roster order.
pub fn seed_class(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    students: usize,
) -> (String, Vec<String>) {
    let created = request_ok(
        stdin,
        reader,
        "seed-class",
        "classes.create",
        json!({
            "schoolId": SCHOOL,
            "name": "Class X",
            "section": "A",
            "academicYear": YEAR,
            "secondLanguage": "Hindi",
            "subjects": [
                { "subjectName": "Telugu", "teacherId": "t-tel" },
                { "subjectName": "Hindi", "teacherId": "t-hin" },
                { "subjectName": "English", "teacherId": "t-eng" },
                { "subjectName": "Maths", "teacherId": "t-mat" },
                { "subjectName": "Physics", "teacherId": "t-phy" },
                { "subjectName": "Biology", "teacherId": "t-bio" },
                { "subjectName": "Science" },
                { "subjectName": "Social", "teacherId": "t-soc" }
            ]
        }),
    );
    let class_id = str_field(&created, "id").to_string();

    let mut ids = Vec::with_capacity(students);
    for i in 0..students {
        let student = request_ok(
            stdin,
            reader,
            &format!("seed-student-{}", i),
            "students.create",
            json!({
                "classId": class_id,
                "name": format!("Student {}", i),
                "fatherName": format!("Father {}", i),
                "admissionNo": format!("ADM{:03}", i),
                "rollNo": format!("{}", i + 1)
            }),
        );
        ids.push(str_field(&student, "studentId").to_string());
    }
    (class_id, ids)
}
