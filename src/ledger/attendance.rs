use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use super::validate::require_student;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{AttendanceEvent, AttendanceStatus, Student, StudentFilter, TenantContext};
use crate::notify::{NoticeSink, Notification};
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy)]
pub struct AttendancePolicy {
    /// Recorded for every `late` mark.
    pub late_minutes: u32,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self { late_minutes: 15 }
    }
}

#[derive(Debug, Clone)]
pub struct MarkRequest {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome {
    pub event: AttendanceEvent,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub student_id: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMarkReport {
    pub marked: usize,
    pub skipped: usize,
    pub failures: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStatistics {
    pub present_count: usize,
    pub absent_count: usize,
    pub late_count: usize,
    pub excused_count: usize,
    /// Whole percent of students in scope who were on site.
    pub rate: u32,
}

#[allow(clippy::too_many_arguments)]
fn build_event(
    student: &Student,
    ctx: &TenantContext,
    id: String,
    date: NaiveDate,
    status: AttendanceStatus,
    notes: Option<String>,
    now: NaiveDateTime,
    policy: &AttendancePolicy,
) -> AttendanceEvent {
    let check_in_time = status.is_on_site().then(|| date.and_time(now.time()));
    AttendanceEvent {
        id,
        tenant_id: ctx.tenant_id.clone(),
        student_id: student.id.clone(),
        class_id: student.class_id.clone(),
        date,
        status,
        check_in_time,
        check_out_time: None,
        late_minutes: if status == AttendanceStatus::Late {
            policy.late_minutes
        } else {
            0
        },
        notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        marked_by: ctx.actor_id.clone(),
        updated_at: now,
    }
}

/// Records one student's outcome for one day. The first mark for a
/// (tenant, student, date) inserts; every later mark overwrites it in place.
pub fn mark<S: LedgerStore>(
    store: &S,
    sink: &dyn NoticeSink,
    ctx: &TenantContext,
    req: MarkRequest,
    now: NaiveDateTime,
    policy: &AttendancePolicy,
) -> LedgerResult<MarkOutcome> {
    let student = require_student(store, ctx, &req.student_id)?;
    let existing = store.find_attendance(&ctx.tenant_id, &student.id, req.date)?;

    let id = existing
        .as_ref()
        .map(|e| e.id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut event = build_event(
        &student, ctx, id, req.date, req.status, req.notes, now, policy,
    );
    // A departure already stamped stays valid while the child still counts as on site.
    if let Some(prev) = existing.as_ref() {
        if event.status.is_on_site() {
            event.check_out_time = prev.check_out_time;
        }
    }

    let stored = store.upsert_attendance(&event)?;
    // A concurrent first mark wins the insert; ours then lands as an update of its row.
    let created = existing.is_none() && stored.id == event.id;
    tracing::debug!(
        tenant_id = %ctx.tenant_id,
        student_id = %stored.student_id,
        date = %stored.date,
        status = stored.status.as_str(),
        created,
        "attendance marked"
    );
    sink.emit(Notification::attendance(
        &ctx.tenant_id,
        &stored.student_id,
        stored.status,
        stored.date,
    ));
    Ok(MarkOutcome {
        event: stored,
        created,
    })
}

/// Marks every active student matching `filter` present for `date`, skipping
/// anyone who already has a record that day. One student's failure never
/// stops the rest.
pub fn mark_all_present<S: LedgerStore>(
    store: &S,
    sink: &dyn NoticeSink,
    ctx: &TenantContext,
    filter: &StudentFilter,
    date: NaiveDate,
    now: NaiveDateTime,
    policy: &AttendancePolicy,
) -> LedgerResult<BulkMarkReport> {
    let scope = StudentFilter {
        include_inactive: false,
        ..filter.clone()
    };
    let students = store.query_students(&ctx.tenant_id, &scope)?;
    let mut report = BulkMarkReport::default();

    for student in &students {
        let attempt = (|| -> LedgerResult<bool> {
            if store
                .find_attendance(&ctx.tenant_id, &student.id, date)?
                .is_some()
            {
                return Ok(false);
            }
            let event = build_event(
                student,
                ctx,
                Uuid::new_v4().to_string(),
                date,
                AttendanceStatus::Present,
                None,
                now,
                policy,
            );
            // Loses quietly to a concurrent mark for the same day.
            store.insert_attendance(&event)
        })();

        match attempt {
            Ok(true) => {
                report.marked += 1;
                sink.emit(Notification::attendance(
                    &ctx.tenant_id,
                    &student.id,
                    AttendanceStatus::Present,
                    date,
                ));
            }
            Ok(false) => report.skipped += 1,
            Err(e) => {
                tracing::warn!(
                    tenant_id = %ctx.tenant_id,
                    student_id = %student.id,
                    error = %e,
                    "bulk mark present failed for student"
                );
                report.failures.push(BulkFailure {
                    student_id: student.id.clone(),
                    code: e.code(),
                    message: e.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        tenant_id = %ctx.tenant_id,
        date = %date,
        marked = report.marked,
        skipped = report.skipped,
        failed = report.failures.len(),
        "bulk mark present finished"
    );
    Ok(report)
}

/// Stamps the departure time on a day's record.
pub fn check_out<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    student_id: &str,
    date: NaiveDate,
    now: NaiveDateTime,
) -> LedgerResult<AttendanceEvent> {
    let student = require_student(store, ctx, student_id)?;
    let mut event = store
        .find_attendance(&ctx.tenant_id, &student.id, date)?
        .ok_or_else(|| {
            LedgerError::not_found("attendance", format!("{} on {}", student.id, date))
        })?;
    if !event.status.is_on_site() {
        return Err(LedgerError::invalid(format!(
            "cannot check out a student marked {}",
            event.status.as_str()
        )));
    }
    event.check_out_time = Some(date.and_time(now.time()));
    event.marked_by = ctx.actor_id.clone().or(event.marked_by.take());
    event.updated_at = now;
    store.update_attendance(&event)?;
    Ok(event)
}

/// Keeps the records that belong to active students in `students`, so
/// numerator and denominator of a rate count the same children.
pub fn records_in_scope(records: &[AttendanceEvent], students: &[Student]) -> Vec<AttendanceEvent> {
    let ids: HashSet<&str> = students
        .iter()
        .filter(|s| s.is_active)
        .map(|s| s.id.as_str())
        .collect();
    records
        .iter()
        .filter(|r| ids.contains(r.student_id.as_str()))
        .cloned()
        .collect()
}

/// Folds already-loaded records into counts and an attendance rate.
pub fn compute_statistics(records: &[AttendanceEvent], total_in_scope: usize) -> AttendanceStatistics {
    let mut stats = AttendanceStatistics::default();
    for r in records {
        match r.status {
            AttendanceStatus::Present => stats.present_count += 1,
            AttendanceStatus::Absent => stats.absent_count += 1,
            AttendanceStatus::Late => stats.late_count += 1,
            AttendanceStatus::Excused => stats.excused_count += 1,
        }
    }
    stats.rate = percent(stats.present_count + stats.late_count, total_in_scope);
    stats
}

/// `round(100 * part / whole)`, or 0 when there is nothing to divide by.
pub fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * part as f64 / whole as f64).round() as u32
}
