mod test_support;

use serde_json::json;
use test_support::{temp_dir, Sidecar};

#[test]
fn login_failures_look_identical() {
    let (mut sc, workspace) = Sidecar::admin("resultsd-auth-generic");
    sc.add_student("ST001", "Ana", "pw1");
    sc.ok("session.logout", json!({}));

    let unknown = sc.err(
        "session.studentLogin",
        json!({ "studentId": "ST404", "password": "pw1" }),
    );
    let wrong = sc.err(
        "session.studentLogin",
        json!({ "studentId": "ST001", "password": "nope" }),
    );
    assert_eq!(unknown, wrong);
    assert_eq!(unknown["code"], json!("auth_failed"));

    let admin_wrong = sc.err(
        "session.adminLogin",
        json!({ "user": "admin", "password": "nope" }),
    );
    assert_eq!(admin_wrong, unknown);

    let session = sc.ok("session.get", json!({}));
    assert_eq!(session["session"]["kind"], json!("anonymous"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn admin_operations_require_an_admin_session() {
    let (mut sc, workspace) = Sidecar::admin("resultsd-auth-guards");
    sc.add_student("ST001", "Ana", "pw1");
    let exam = sc.add_exam("Mid-Term");

    sc.ok("session.logout", json!({}));
    assert_eq!(sc.err_code("students.list", json!({})), "forbidden");
    assert_eq!(sc.err_code("results.ranking", json!({})), "forbidden");
    assert_eq!(sc.err_code("dashboard.open", json!({})), "forbidden");

    let signed_in = sc.ok(
        "session.studentLogin",
        json!({ "studentId": "ST001", "password": "pw1" }),
    );
    assert_eq!(signed_in["session"]["kind"], json!("student"));
    assert_eq!(signed_in["session"]["studentId"], json!("ST001"));

    for (method, params) in [
        ("students.create", json!({ "studentId": "ST002", "name": "Ben", "password": "pw" })),
        ("students.delete", json!({ "studentId": "ST001" })),
        ("exams.create", json!({ "name": "Final" })),
        ("exams.setPublished", json!({ "examId": exam, "published": true })),
        ("marks.open", json!({ "examId": exam })),
        ("config.get", json!({})),
    ] {
        assert_eq!(sc.err_code(method, params), "forbidden", "{}", method);
    }
    sc.ok("results.ranking", json!({}));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn logout_drops_the_open_working_copy() {
    let (mut sc, workspace) = Sidecar::admin("resultsd-auth-logout");
    sc.add_student("ST001", "Ana", "pw1");
    let exam = sc.add_exam("Mid-Term");
    sc.ok("marks.open", json!({ "examId": exam }));
    sc.ok(
        "marks.edit",
        json!({ "studentId": "ST001", "field": "mcq", "value": 5 }),
    );

    let out = sc.ok("session.logout", json!({}));
    assert_eq!(out["session"]["kind"], json!("anonymous"));
    sc.ok(
        "session.adminLogin",
        json!({ "user": "admin", "password": "admin123" }),
    );
    assert_eq!(sc.err_code("marks.view", json!({})), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn admin_credentials_follow_config_and_survive_restart() {
    let (mut sc, workspace) = Sidecar::admin("resultsd-auth-config");
    let cfg = sc.ok(
        "config.update",
        json!({ "patch": { "adminUser": "head", "adminPassword": "s3cret" } }),
    );
    assert_eq!(cfg["config"]["adminUser"], json!("head"));
    assert!(cfg["config"].get("adminPassword").is_none());
    assert_eq!(
        sc.err_code("config.update", json!({ "patch": { "colour": "blue" } })),
        "bad_params"
    );
    drop(sc);

    let mut sc = Sidecar::spawn();
    sc.ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        sc.err_code(
            "session.adminLogin",
            json!({ "user": "admin", "password": "admin123" })
        ),
        "auth_failed"
    );
    sc.ok(
        "session.adminLogin",
        json!({ "user": "head", "password": "s3cret" }),
    );
    let got = sc.ok("config.get", json!({}));
    assert_eq!(got["config"]["seedPolicy"], json!("present"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn switching_workspace_signs_out() {
    let (mut sc, workspace) = Sidecar::admin("resultsd-auth-switch");
    let other = temp_dir("resultsd-auth-switch-other");
    sc.ok("workspace.select", json!({ "path": other.to_string_lossy() }));
    let session = sc.ok("session.get", json!({}));
    assert_eq!(session["session"]["kind"], json!("anonymous"));

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(other);
}
