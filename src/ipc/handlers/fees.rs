use crate::ipc::helpers::{
    get_optional_date, get_optional_decimal, get_optional_enum, get_optional_str,
    get_required_date, get_required_decimal, get_required_str, tenant_context, today, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::fees::{self, NewFee};
use crate::model::FeeStatus;
use crate::store::{FeeQuery, SqliteStore};
use rust_decimal::Decimal;
use serde_json::json;

fn handle_fees_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let input = NewFee {
            student_id: get_required_str(&req.params, "studentId")?,
            amount: get_required_decimal(&req.params, "amount")?,
            fee_type: get_required_str(&req.params, "feeType")?,
            due_date: get_required_date(&req.params, "dueDate")?,
            discount: get_optional_decimal(&req.params, "discount")?.unwrap_or(Decimal::ZERO),
            notes: get_optional_str(&req.params, "notes"),
        };
        let fee = fees::create_fee(&SqliteStore::new(conn), &ctx, input)?;
        Ok(json!({ "fee": fee }))
    })
}

fn handle_fees_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let query = FeeQuery {
            student_id: get_optional_str(&req.params, "studentId"),
            status: get_optional_enum::<FeeStatus>(&req.params, "status")?,
        };
        let today = get_optional_date(&req.params, "today")?.unwrap_or_else(today);
        let views = fees::list_fees(&SqliteStore::new(conn), &ctx, &query, today)?;
        Ok(json!({ "fees": views }))
    })
}

fn handle_fees_mark_paid(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let fee_id = get_required_str(&req.params, "feeId")?;
        let settlement = fees::mark_paid(&SqliteStore::new(conn), &ctx, &fee_id, today())?;
        Ok(serde_json::to_value(settlement)?)
    })
}

fn handle_fees_send_reminder(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, state| {
        let ctx = tenant_context(&req.params)?;
        let fee_id = get_required_str(&req.params, "feeId")?;
        let delivery = fees::send_payment_reminder(
            &SqliteStore::new(conn),
            &state.dispatcher,
            &ctx,
            &fee_id,
            today(),
            state.settings.notifications.timeout(),
        )?;
        Ok(json!({ "feeId": fee_id, "delivery": delivery }))
    })
}

fn handle_fees_refresh_overdue(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let today = get_optional_date(&req.params, "today")?.unwrap_or_else(today);
        let updated = fees::refresh_overdue(&SqliteStore::new(conn), &ctx, today)?;
        Ok(json!({ "updated": updated }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.create" => Some(handle_fees_create(state, req)),
        "fees.list" => Some(handle_fees_list(state, req)),
        "fees.markPaid" => Some(handle_fees_mark_paid(state, req)),
        "fees.sendReminder" => Some(handle_fees_send_reminder(state, req)),
        "fees.refreshOverdue" => Some(handle_fees_refresh_overdue(state, req)),
        _ => None,
    }
}
