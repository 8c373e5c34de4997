mod test_support;

use serde_json::json;
use test_support::Sidecar;

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut sc, workspace) = Sidecar::admin("resultsd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let csv_out = workspace.join("smoke-export.csv");

    let methods: Vec<(&str, serde_json::Value)> = vec![
        ("health", json!({})),
        ("session.get", json!({})),
        ("students.create", json!({ "studentId": "ST001", "name": "Ana", "password": "pw1" })),
        ("students.list", json!({})),
        ("exams.create", json!({ "name": "Mid-Term" })),
        ("exams.list", json!({})),
        ("exams.setPublished", json!({ "examId": 1, "published": true })),
        ("exams.togglePublished", json!({ "examId": 1 })),
        ("marks.open", json!({ "examId": 1 })),
        ("marks.edit", json!({ "studentId": "ST001", "field": "mcq", "value": 10 })),
        ("marks.view", json!({})),
        ("marks.save", json!({})),
        ("marks.discard", json!({})),
        ("results.ranking", json!({})),
        ("config.get", json!({})),
        ("config.update", json!({ "patch": { "seedPolicy": "present" } })),
        ("exchange.exportExamCsv", json!({ "examId": 1, "outPath": csv_out.to_string_lossy() })),
        ("backup.exportWorkspaceBundle", json!({ "outPath": bundle_out.to_string_lossy() })),
        ("exams.delete", json!({ "examId": 1 })),
        ("students.delete", json!({ "studentId": "ST001" })),
        ("session.logout", json!({})),
        ("dashboard.open", json!({})),
        ("session.studentLogin", json!({ "studentId": "ST404", "password": "x" })),
    ];

    for (method, params) in methods {
        let resp = sc.request(method, params);
        if resp.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let code = resp["error"]["code"].as_str().unwrap_or("unknown");
            assert_ne!(code, "not_implemented", "unexpected unknown method for {}", method);
        }
    }

    let resp = sc.request("nope.nothing", json!({}));
    assert_eq!(resp["ok"], json!(false));
    assert_eq!(resp["error"]["code"], json!("not_implemented"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn requests_before_workspace_select_report_no_workspace() {
    let mut sc = Sidecar::spawn();
    let health = sc.ok("health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));
    assert_eq!(health["session"]["kind"], json!("anonymous"));

    assert_eq!(
        sc.err_code("session.studentLogin", json!({ "studentId": "ST001", "password": "pw" })),
        "no_workspace"
    );
    assert_eq!(sc.err_code("workspace.select", json!({})), "bad_params");
}
