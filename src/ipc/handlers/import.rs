use crate::db::{self, GradeStore, SqliteStore};
use crate::error::ImportError;
use crate::ingest::header::HeaderVocabulary;
use crate::ingest::merge::MatchPolicy;
use crate::ingest::{self, ImportOptions, ImportOutcome};
use crate::ipc::error::{err, ok, required_str};
use crate::ipc::types::{Request, ServerState};
use crate::sheet;
use anyhow::Context;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;

const HEADER_VOCABULARY_KEY: &str = "import.headerVocabulary";
const STUDENT_MATCH_KEY: &str = "import.studentMatch";

fn load_import_settings(conn: &Connection) -> anyhow::Result<(HeaderVocabulary, MatchPolicy)> {
    let vocabulary = match db::settings_get_json(conn, HEADER_VOCABULARY_KEY)? {
        Some(v) => serde_json::from_value(v).context("invalid stored header vocabulary")?,
        None => HeaderVocabulary::default(),
    };
    let policy = match db::settings_get_json(conn, STUDENT_MATCH_KEY)? {
        Some(v) => serde_json::from_value(v).context("invalid stored student match policy")?,
        None => MatchPolicy::default(),
    };
    Ok((vocabulary, policy))
}

fn success_message(outcome: &ImportOutcome) -> String {
    if outcome.overwritten {
        format!(
            "覆盖成功！已更新 {} 名学生的《{}》成绩。",
            outcome.updated_count, outcome.exam.name
        )
    } else {
        format!(
            "导入成功！已导入 {} 名学生的《{}》成绩。",
            outcome.updated_count, outcome.exam.name
        )
    }
}

fn import_error(req: &Request, e: &ImportError) -> serde_json::Value {
    let details = match e {
        ImportError::OverwriteDeclined { exam_id, exam_name } => {
            Some(json!({ "examId": exam_id, "examName": exam_name }))
        }
        ImportError::PartialWrite { applied, total, .. } => {
            Some(json!({ "applied": applied, "total": total }))
        }
        _ => None,
    };
    err(&req.id, e.code(), e.to_string(), details)
}

fn handle_grades_import_sheet(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let path = match required_str(&req.id, &req.params, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(conn);

    let semester = match req.params.get("semester").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => match store.get_app_state() {
            Ok(app_state) => app_state.current_semester,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        },
    };
    let exam_name = match req.params.get("examName").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => sheet::exam_name_from_path(&path),
    };
    let overwrite = req
        .params
        .get("overwrite")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let (vocabulary, match_policy) = match load_import_settings(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let mut opts = ImportOptions::new(exam_name, semester);
    opts.vocabulary = vocabulary;
    opts.match_policy = match_policy;

    let mut confirm = |_: &str| overwrite;
    match ingest::import_file(&store, &path, &opts, &mut confirm) {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "examId": outcome.exam.id,
                "examName": outcome.exam.name,
                "semester": outcome.exam.semester,
                "overwritten": outcome.overwritten,
                "updatedCount": outcome.updated_count,
                "createdStudents": outcome.created_students,
                "recalculatedTotals": outcome.recalculated_totals,
                "notice": {
                    "message": success_message(&outcome),
                    "kind": "success",
                },
            }),
        ),
        Err(e) => {
            warn!(path = %path.to_string_lossy(), error = %e, "sheet import failed");
            import_error(req, &e)
        }
    }
}

fn handle_import_settings_get(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match load_import_settings(conn) {
        Ok((vocabulary, policy)) => ok(
            &req.id,
            json!({ "headerVocabulary": vocabulary, "studentMatch": policy }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_import_settings_set(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let vocabulary = match req.params.get("headerVocabulary") {
        Some(v) => match serde_json::from_value::<HeaderVocabulary>(v.clone()) {
            Ok(vocab) => Some(vocab),
            Err(e) => return err(&req.id, "bad_params", format!("headerVocabulary: {e}"), None),
        },
        None => None,
    };
    let policy = match req.params.get("studentMatch") {
        Some(v) => match serde_json::from_value::<MatchPolicy>(v.clone()) {
            Ok(p) => Some(p),
            Err(e) => return err(&req.id, "bad_params", format!("studentMatch: {e}"), None),
        },
        None => None,
    };

    let write = || -> anyhow::Result<()> {
        if let Some(vocab) = &vocabulary {
            db::settings_set_json(conn, HEADER_VOCABULARY_KEY, &serde_json::to_value(vocab)?)?;
        }
        if let Some(p) = &policy {
            db::settings_set_json(conn, STUDENT_MATCH_KEY, &serde_json::to_value(p)?)?;
        }
        Ok(())
    };
    if let Err(e) = write() {
        return err(&req.id, "db_insert_failed", format!("{e:#}"), None);
    }

    match load_import_settings(conn) {
        Ok((vocabulary, policy)) => ok(
            &req.id,
            json!({ "headerVocabulary": vocabulary, "studentMatch": policy }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut ServerState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.importSheet" => Some(handle_grades_import_sheet(state, req)),
        "import.settings.get" => Some(handle_import_settings_get(state, req)),
        "import.settings.set" => Some(handle_import_settings_set(state, req)),
        _ => None,
    }
}
