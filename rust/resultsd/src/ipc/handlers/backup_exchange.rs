use crate::backup;
use crate::ipc::error::{err, ok, portal_err};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{db_conn, require_admin, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use crate::store;
use serde_json::json;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => {
            log::error!("backup export failed: {:#}", e);
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    };

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256,
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    state.db = None;
    state.working_copy = None;

    let import = backup::import_workspace_bundle(&src, &workspace_path);
    // Reopen whichever database is now on disk, restored or not.
    if let Err(e) = open_workspace(state, workspace_path.clone()) {
        return err(&req.id, "db_open_failed", format!("{e:?}"), None);
    }
    state.session = Session::Admin;

    match import {
        Ok(summary) => ok(
            &req.id,
            json!({
                "ok": true,
                "workspacePath": workspace_path.to_string_lossy(),
                "bundleFormatDetected": summary.bundle_format_detected,
            }),
        ),
        Err(e) => {
            log::error!("backup import failed: {:#}", e);
            err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": src.to_string_lossy() })),
            )
        }
    }
}

fn handle_exchange_export_exam_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(resp) = require_admin(state, req) {
        return resp;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let exam_id = match required_i64(req, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match store::get_exam(conn, exam_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "exam not found", None),
        Err(e) => return portal_err(&req.id, &e),
    }
    let marks = match store::marks_for_exam(conn, exam_id) {
        Ok(m) => m,
        Err(e) => return portal_err(&req.id, &e),
    };

    let mut csv = String::from("student_id,student_name,mcq,structured,essay,total,absent\n");
    for m in &marks {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            csv_quote(&m.student_id),
            csv_quote(m.student_name.as_deref().unwrap_or("")),
            m.mcq,
            m.structured,
            m.essay,
            m.total().map(|t| t.to_string()).unwrap_or_default(),
            if m.absent { "yes" } else { "no" },
        ));
    }

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, csv) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }
    log::info!("exported {} marks of exam {} to {}", marks.len(), exam_id, out_path);

    ok(
        &req.id,
        json!({ "ok": true, "rowsExported": marks.len(), "path": out_path }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        "exchange.exportExamCsv" => Some(handle_exchange_export_exam_csv(state, req)),
        _ => None,
    }
}
