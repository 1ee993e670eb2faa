use crate::ipc::helpers::{
    date_range, get_optional_date, get_optional_str, get_optional_u64, tenant_context, today,
    with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::fees::compute_financial_stats;
use crate::model::{DateRange, StudentFilter};
use crate::stats::{build_dashboard, ReportInput};
use crate::store::{FeeQuery, LedgerStore, SqliteStore};
use chrono::NaiveDate;
use serde_json::json;

const DEFAULT_TOP_N: u64 = 5;

/// Everything up to the end of the window: totals are cumulative, the
/// `monthly*` figures cover the window only.
fn history_until(end: NaiveDate) -> DateRange {
    DateRange {
        start: NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN),
        end,
    }
}

fn handle_reports_financial(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let today = get_optional_date(&req.params, "today")?.unwrap_or_else(today);
        let period = date_range(&req.params, today)?;
        let store = SqliteStore::new(conn);
        let transactions = store.query_transactions(&ctx.tenant_id, &history_until(period.end))?;
        let fees = store.query_fees(&ctx.tenant_id, &FeeQuery::default())?;
        let stats = compute_financial_stats(&transactions, &fees, &period, today);
        Ok(json!({ "period": period, "stats": stats }))
    })
}

fn handle_reports_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let today = get_optional_date(&req.params, "today")?.unwrap_or_else(today);
        let period = date_range(&req.params, today)?;
        let class_id = get_optional_str(&req.params, "classId");
        let top_n = get_optional_u64(&req.params, "topN")?.unwrap_or(DEFAULT_TOP_N) as usize;

        let store = SqliteStore::new(conn);
        let students = store.query_students(
            &ctx.tenant_id,
            &StudentFilter {
                class_id: class_id.clone(),
                ..Default::default()
            },
        )?;
        let classes: Vec<_> = store
            .query_classes(&ctx.tenant_id)?
            .into_iter()
            .filter(|c| class_id.as_deref().map_or(true, |id| id == c.id))
            .collect();
        let attendance = store.query_attendance(&ctx.tenant_id, &period, class_id.as_deref())?;
        let transactions = store.query_transactions(&ctx.tenant_id, &history_until(period.end))?;
        let fees = store.query_fees(&ctx.tenant_id, &FeeQuery::default())?;
        let rewards = store.query_rewards(&ctx.tenant_id, &period)?;

        let dashboard = build_dashboard(&ReportInput {
            period,
            today,
            students: &students,
            classes: &classes,
            attendance: &attendance,
            transactions: &transactions,
            fees: &fees,
            rewards: &rewards,
            top_n,
        });
        Ok(serde_json::to_value(dashboard)?)
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.financial" => Some(handle_reports_financial(state, req)),
        "reports.dashboard" => Some(handle_reports_dashboard(state, req)),
        _ => None,
    }
}
