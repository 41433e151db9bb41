use crate::backup;
use crate::db::{GradeStore, SqliteStore};
use crate::ipc::error::{err, ok, required_str};
use crate::ipc::types::{Request, ServerState};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_backup_export(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_str(&req.id, &req.params, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    match backup::export_backup(conn, &out_path) {
        Ok(summary) => {
            info!(path = %out_path.to_string_lossy(), students = summary.students, "backup exported");
            ok(
                &req.id,
                json!({
                    "path": out_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "entryCount": summary.entry_count,
                    "students": summary.students,
                    "exams": summary.exams,
                }),
            )
        }
        Err(e) => err(&req.id, "backup_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_import(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match required_str(&req.id, &req.params, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    match backup::import_backup(conn, &in_path) {
        Ok(summary) => {
            info!(
                path = %in_path.to_string_lossy(),
                format = %summary.bundle_format_detected,
                students = summary.students,
                exams = summary.exams,
                "backup restored"
            );
            ok(
                &req.id,
                json!({
                    "bundleFormatDetected": summary.bundle_format_detected,
                    "students": summary.students,
                    "exams": summary.exams,
                }),
            )
        }
        Err(e) => err(&req.id, "backup_failed", format!("{e:#}"), None),
    }
}

fn handle_data_clear(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match SqliteStore::new(conn).clear_all() {
        Ok(()) => {
            info!("workspace records cleared");
            ok(&req.id, json!({ "cleared": true }))
        }
        Err(e) => err(&req.id, "db_tx_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut ServerState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        "data.clear" => Some(handle_data_clear(state, req)),
        _ => None,
    }
}
