use crate::ipc::helpers::{
    get_optional_date, get_optional_str, get_required_enum, get_required_str, now,
    tenant_context, today, with_db,
};
use crate::ipc::types::{AppState, Request};
use crate::ledger::attendance::{self, AttendancePolicy, MarkRequest};
use crate::model::{AttendanceStatus, DateRange, StudentFilter};
use crate::store::{LedgerStore, SqliteStore};
use serde_json::json;

fn policy(state: &AppState) -> AttendancePolicy {
    AttendancePolicy {
        late_minutes: state.settings.attendance.late_minutes,
    }
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, state| {
        let ctx = tenant_context(&req.params)?;
        let mark = MarkRequest {
            student_id: get_required_str(&req.params, "studentId")?,
            date: get_optional_date(&req.params, "date")?.unwrap_or_else(today),
            status: get_required_enum::<AttendanceStatus>(&req.params, "status")?,
            notes: get_optional_str(&req.params, "notes"),
        };
        let store = SqliteStore::new(conn);
        let outcome = attendance::mark(&store, &state.outbox, &ctx, mark, now(), &policy(state))?;
        Ok(serde_json::to_value(outcome)?)
    })
}

fn handle_attendance_mark_all_present(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, state| {
        let ctx = tenant_context(&req.params)?;
        let date = get_optional_date(&req.params, "date")?.unwrap_or_else(today);
        let filter = StudentFilter {
            class_id: get_optional_str(&req.params, "classId"),
            search: get_optional_str(&req.params, "search"),
            ..Default::default()
        };
        let store = SqliteStore::new(conn);
        let report = attendance::mark_all_present(
            &store,
            &state.outbox,
            &ctx,
            &filter,
            date,
            now(),
            &policy(state),
        )?;
        Ok(serde_json::to_value(report)?)
    })
}

fn handle_attendance_check_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let student_id = get_required_str(&req.params, "studentId")?;
        let date = get_optional_date(&req.params, "date")?.unwrap_or_else(today);
        let event = attendance::check_out(&SqliteStore::new(conn), &ctx, &student_id, date, now())?;
        Ok(json!({ "event": event }))
    })
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let date = get_optional_date(&req.params, "date")?.unwrap_or_else(today);
        let class_id = get_optional_str(&req.params, "classId");
        let records = SqliteStore::new(conn).query_attendance(
            &ctx.tenant_id,
            &DateRange::day(date),
            class_id.as_deref(),
        )?;
        Ok(json!({ "date": date, "records": records }))
    })
}

fn handle_attendance_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_db(state, req, |conn, _| {
        let ctx = tenant_context(&req.params)?;
        let date = get_optional_date(&req.params, "date")?.unwrap_or_else(today);
        let class_id = get_optional_str(&req.params, "classId");
        let store = SqliteStore::new(conn);
        let students = store.query_students(
            &ctx.tenant_id,
            &StudentFilter {
                class_id: class_id.clone(),
                ..Default::default()
            },
        )?;
        let records =
            store.query_attendance(&ctx.tenant_id, &DateRange::day(date), class_id.as_deref())?;
        let records = attendance::records_in_scope(&records, &students);
        let stats = attendance::compute_statistics(&records, students.len());
        Ok(json!({
            "date": date,
            "totalStudents": students.len(),
            "stats": stats,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.markAllPresent" => Some(handle_attendance_mark_all_present(state, req)),
        "attendance.checkOut" => Some(handle_attendance_check_out(state, req)),
        "attendance.list" => Some(handle_attendance_list(state, req)),
        "attendance.stats" => Some(handle_attendance_stats(state, req)),
        _ => None,
    }
}
