use crate::db::{GradeStore, SqliteStore};
use crate::ipc::error::{err, ok, required_str};
use crate::ipc::types::{Request, ServerState};
use crate::model::AppState;
use serde_json::json;

fn handle_semesters_list(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match SqliteStore::new(conn).get_all_semesters() {
        Ok(semesters) => ok(&req.id, json!({ "semesters": semesters })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_semesters_add(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let semester = match required_str(&req.id, &req.params, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match SqliteStore::new(conn).put_semester(&semester) {
        Ok(()) => ok(&req.id, json!({ "semester": semester })),
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:#}"), None),
    }
}

fn handle_app_state_get(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match SqliteStore::new(conn).get_app_state() {
        Ok(app_state) => ok(&req.id, json!(app_state)),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_app_state_set(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let current_semester = match required_str(&req.id, &req.params, "currentSemester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let app_state = AppState { current_semester };
    match SqliteStore::new(conn).save_app_state(&app_state) {
        Ok(()) => ok(&req.id, json!(app_state)),
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut ServerState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "semesters.list" => Some(handle_semesters_list(state, req)),
        "semesters.add" => Some(handle_semesters_add(state, req)),
        "appState.get" => Some(handle_app_state_get(state, req)),
        "appState.set" => Some(handle_app_state_set(state, req)),
        _ => None,
    }
}
