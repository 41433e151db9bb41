use crate::db::{GradeStore, SqliteStore};
use crate::ipc::error::{err, ok, required_str};
use crate::ipc::types::{Request, ServerState};
use serde_json::json;

fn handle_students_list(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let students = match SqliteStore::new(conn).get_all_students() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "gender": s.gender,
                "gradeCount": s.grades.len(),
            })
        })
        .collect();
    ok(&req.id, json!({ "students": rows }))
}

fn handle_students_delete(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match required_str(&req.id, &req.params, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(conn);
    let exists = match store.get_all_students() {
        Ok(v) => v.iter().any(|s| s.id == student_id),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    if !exists {
        return err(
            &req.id,
            "not_found",
            "student not found",
            Some(json!({ "studentId": student_id })),
        );
    }
    match store.delete_student(&student_id) {
        Ok(()) => ok(&req.id, json!({ "studentId": student_id })),
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut ServerState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
