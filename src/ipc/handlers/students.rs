use crate::ipc::helpers::{
    get_optional_bool, get_optional_str, get_required_str, tenant_context, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentFilter;
use crate::roster;
use crate::store::{LedgerStore, SqliteStore};
use serde_json::json;

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let full_name = get_required_str(&req.params, "fullName")?;
        let class_id = get_optional_str(&req.params, "classId");
        let student = roster::create_student(conn, &ctx, &full_name, class_id.as_deref())?;
        Ok(json!({ "student": student }))
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let filter = StudentFilter {
            class_id: get_optional_str(&req.params, "classId"),
            search: get_optional_str(&req.params, "search"),
            include_inactive: get_optional_bool(&req.params, "includeInactive")?.unwrap_or(false),
        };
        let students = SqliteStore::new(conn).query_students(&ctx.tenant_id, &filter)?;
        Ok(json!({ "students": students }))
    })
}

fn handle_students_deactivate(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let student = roster::set_student_active(conn, &ctx, &student_id, false)?;
        Ok(json!({ "student": student }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.deactivate" => Some(handle_students_deactivate(state, req)),
        _ => None,
    }
}
