use crate::db::{self, GradeStore, SqliteStore};
use crate::ipc::error::{err, ok, required_str};
use crate::ipc::types::{Request, ServerState};
use crate::model::Exam;
use crate::reports;
use serde_json::json;
use tracing::info;

fn find_exam(store: &SqliteStore<'_>, req: &Request, exam_id: &str) -> Result<Exam, serde_json::Value> {
    let exams = store
        .get_all_exams()
        .map_err(|e| err(&req.id, "db_query_failed", format!("{e:#}"), None))?;
    exams
        .into_iter()
        .find(|e| e.id == exam_id)
        .ok_or_else(|| {
            err(
                &req.id,
                "not_found",
                "exam not found",
                Some(json!({ "examId": exam_id })),
            )
        })
}

fn handle_exams_list(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let store = SqliteStore::new(conn);
    let semester = match req.params.get("semester").and_then(|v| v.as_str()) {
        Some(s) => s.to_string(),
        None => match store.get_app_state() {
            Ok(app_state) => app_state.current_semester,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        },
    };
    match store.get_all_exams() {
        Ok(exams) => ok(
            &req.id,
            json!({
                "semester": semester,
                "exams": reports::semester_exams(exams, &semester),
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_exams_subjects(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match required_str(&req.id, &req.params, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exam = match find_exam(&SqliteStore::new(conn), req, &exam_id) {
        Ok(e) => e,
        Err(resp) => return resp,
    };
    let subjects: Vec<&str> = exam.subjects.iter().map(|s| s.name.as_str()).collect();
    ok(&req.id, json!({ "examId": exam.id, "subjects": subjects }))
}

fn handle_exams_results(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match required_str(&req.id, &req.params, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(conn);
    let exam = match find_exam(&store, req, &exam_id) {
        Ok(e) => e,
        Err(resp) => return resp,
    };
    let students = match store.get_all_students() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    ok(
        &req.id,
        json!({
            "exam": exam,
            "rows": reports::exam_results(&exam, &students),
        }),
    )
}

fn handle_exams_subject_ranking(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match required_str(&req.id, &req.params, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match required_str(&req.id, &req.params, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let students = match SqliteStore::new(conn).get_all_students() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    ok(
        &req.id,
        json!({
            "examId": exam_id,
            "subject": subject,
            "rows": reports::subject_ranking(&exam_id, &subject, &students),
        }),
    )
}

fn handle_exams_delete(state: &mut ServerState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let exam_id = match required_str(&req.id, &req.params, "examId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = SqliteStore::new(conn);
    let students = match store.get_all_students() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut students_updated = 0;
    for mut student in students {
        if !student.remove_grades_for(&exam_id) {
            continue;
        }
        if let Err(e) = db::write_student(&tx, &student) {
            return err(
                &req.id,
                "db_insert_failed",
                format!("{e:#}"),
                Some(json!({ "studentId": student.id })),
            );
        }
        students_updated += 1;
    }
    if let Err(e) = db::remove_exam(&tx, &exam_id) {
        return err(&req.id, "db_insert_failed", format!("{e:#}"), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    info!(exam_id = %exam_id, students_updated, "exam deleted");
    ok(
        &req.id,
        json!({ "examId": exam_id, "studentsUpdated": students_updated }),
    )
}

pub fn try_handle(state: &mut ServerState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exams.list" => Some(handle_exams_list(state, req)),
        "exams.subjects" => Some(handle_exams_subjects(state, req)),
        "exams.results" => Some(handle_exams_results(state, req)),
        "exams.subjectRanking" => Some(handle_exams_subject_ranking(state, req)),
        "exams.delete" => Some(handle_exams_delete(state, req)),
        _ => None,
    }
}
