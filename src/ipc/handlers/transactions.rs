use crate::ipc::helpers::{
    date_range, get_optional_date, get_optional_str, get_required_decimal, get_required_enum,
    get_required_str, tenant_context, today, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::fees::{self, NewTransaction};
use crate::model::TransactionType;
use crate::store::{LedgerStore, SqliteStore};
use serde_json::json;

fn handle_transactions_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let input = NewTransaction {
            kind: get_required_enum::<TransactionType>(&req.params, "type")?,
            category: get_required_str(&req.params, "category")?,
            amount: get_required_decimal(&req.params, "amount")?,
            description: get_optional_str(&req.params, "description").unwrap_or_default(),
            reference_number: get_optional_str(&req.params, "referenceNumber"),
            date: get_optional_date(&req.params, "date")?.unwrap_or_else(today),
        };
        let txn = fees::record_transaction(&SqliteStore::new(conn), &ctx, input)?;
        Ok(json!({ "transaction": txn }))
    })
}

fn handle_transactions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let range = date_range(&req.params, today())?;
        let txns = SqliteStore::new(conn).query_transactions(&ctx.tenant_id, &range)?;
        Ok(json!({ "range": range, "transactions": txns }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "transactions.record" => Some(handle_transactions_record(state, req)),
        "transactions.list" => Some(handle_transactions_list(state, req)),
        _ => None,
    }
}
