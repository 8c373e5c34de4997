#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos(),
        DIR_SEQ.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: usize,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_resultsd");
        let mut child = Command::new(exe)
            .env_remove("RESULTSD_ADMIN_PASSWORD")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn resultsd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns, selects a fresh workspace and signs in as the default admin.
    pub fn admin(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut sidecar = Sidecar::spawn();
        sidecar.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        sidecar.ok(
            "session.adminLogin",
            json!({ "user": "admin", "password": "admin123" }),
        );
        (sidecar, workspace)
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Expects a failure and returns the whole error object.
    pub fn err(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().expect("error object")
    }

    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        self.err(method, params)
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    pub fn add_student(&mut self, student_id: &str, name: &str, password: &str) {
        self.ok(
            "students.create",
            json!({ "studentId": student_id, "name": name, "password": password }),
        );
    }

    pub fn add_exam(&mut self, name: &str) -> i64 {
        let result = self.ok("exams.create", json!({ "name": name }));
        result["exam"]["id"].as_i64().expect("exam id")
    }

    /// Opens the exam, writes the three section scores for each student, saves.
    pub fn enter_marks(&mut self, exam_id: i64, rows: &[(&str, i64, i64, i64)]) {
        self.ok("marks.open", json!({ "examId": exam_id }));
        for (student_id, mcq, structured, essay) in rows {
            for (field, value) in [("mcq", mcq), ("structured", structured), ("essay", essay)] {
                self.ok(
                    "marks.edit",
                    json!({ "studentId": student_id, "field": field, "value": value }),
                );
            }
        }
        self.ok("marks.save", json!({}));
    }

    pub fn publish(&mut self, exam_id: i64) {
        self.ok(
            "exams.setPublished",
            json!({ "examId": exam_id, "published": true }),
        );
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
