use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_optional_str, get_required_str, now, tenant_context, with_db};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use serde_json::json;

fn handle_rewards_award(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let points = req
            .params
            .get("points")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HandlerErr::bad_params("points must be an integer"))?;
        let reason = get_optional_str(&req.params, "reason");
        let entry =
            roster::award_points(conn, &ctx, &student_id, points, reason.as_deref(), now())?;
        Ok(json!({ "reward": entry }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rewards.award" => Some(handle_rewards_award(state, req)),
        _ => None,
    }
}
