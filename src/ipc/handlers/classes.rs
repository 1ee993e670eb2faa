use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_u64, get_required_str, tenant_context, with_db};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentFilter;
use crate::roster;
use crate::store::{LedgerStore, SqliteStore};
use serde_json::json;

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let name = get_required_str(&req.params, "name")?;
        let capacity = get_optional_u64(&req.params, "capacity")?.unwrap_or(0);
        let capacity = u32::try_from(capacity)
            .map_err(|_| HandlerErr::bad_params("capacity is out of range"))?;
        let class = roster::create_class(conn, &ctx, &name, capacity)?;
        Ok(json!({ "class": class }))
    })
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let store = SqliteStore::new(conn);
        let classes = store.query_classes(&ctx.tenant_id)?;
        let students = store.query_students(&ctx.tenant_id, &StudentFilter::default())?;

        // Active enrolment next to capacity so callers can show occupancy per class.
        let rows: Vec<serde_json::Value> = classes
            .iter()
            .map(|c| {
                let enrolled = students
                    .iter()
                    .filter(|s| s.class_id.as_deref() == Some(c.id.as_str()))
                    .count();
                json!({
                    "id": c.id,
                    "name": c.name,
                    "capacity": c.capacity,
                    "studentCount": enrolled,
                })
            })
            .collect();
        Ok(json!({ "classes": rows }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        _ => None,
    }
}
