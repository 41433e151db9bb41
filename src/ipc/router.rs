use super::handlers;
use super::types::{Request, ServerState};
use crate::ipc::error::err;

pub fn handle_request(state: &mut ServerState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::semesters::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::exams::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::import::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
