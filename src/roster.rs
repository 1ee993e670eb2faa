//! Tenant-scoped classes, students and reward points: the records the ledgers
//! reference but do not own.

use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::validate::{require_non_empty, require_student};
use crate::model::{Class, RewardEntry, Student, TenantContext};
use crate::store::{LedgerStore, SqliteStore};

pub fn create_class(
    conn: &Connection,
    ctx: &TenantContext,
    name: &str,
    capacity: u32,
) -> LedgerResult<Class> {
    let name = require_non_empty(name, "name")?;
    let class = Class {
        id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        name,
        capacity,
    };
    conn.execute(
        "INSERT INTO classes(id, tenant_id, name, capacity, created_at) VALUES(?, ?, ?, ?, ?)",
        params![
            class.id,
            class.tenant_id,
            class.name,
            class.capacity,
            Local::now().naive_local()
        ],
    )?;
    Ok(class)
}

fn class_in_tenant(conn: &Connection, ctx: &TenantContext, class_id: &str) -> LedgerResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM classes WHERE id = ? AND tenant_id = ?",
            [class_id, ctx.tenant_id.as_str()],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn create_student(
    conn: &Connection,
    ctx: &TenantContext,
    full_name: &str,
    class_id: Option<&str>,
) -> LedgerResult<Student> {
    let full_name = require_non_empty(full_name, "fullName")?;
    if let Some(cid) = class_id {
        if !class_in_tenant(conn, ctx, cid)? {
            return Err(LedgerError::not_found("class", cid));
        }
    }
    let student = Student {
        id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        full_name,
        class_id: class_id.map(str::to_string),
        is_active: true,
    };
    conn.execute(
        "INSERT INTO students(id, tenant_id, full_name, class_id, is_active, created_at)
         VALUES(?, ?, ?, ?, 1, ?)",
        params![
            student.id,
            student.tenant_id,
            student.full_name,
            student.class_id,
            Local::now().naive_local()
        ],
    )?;
    Ok(student)
}

/// Students are never deleted while their history matters; they are switched off.
pub fn set_student_active(
    conn: &Connection,
    ctx: &TenantContext,
    student_id: &str,
    active: bool,
) -> LedgerResult<Student> {
    let store = SqliteStore::new(conn);
    let mut student = require_student(&store, ctx, student_id)?;
    conn.execute(
        "UPDATE students SET is_active = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        params![
            active as i64,
            Local::now().naive_local(),
            student.id,
            ctx.tenant_id
        ],
    )?;
    student.is_active = active;
    Ok(student)
}

pub fn award_points(
    conn: &Connection,
    ctx: &TenantContext,
    student_id: &str,
    points: i64,
    reason: Option<&str>,
    awarded_at: NaiveDateTime,
) -> LedgerResult<RewardEntry> {
    if points <= 0 {
        return Err(LedgerError::invalid("points must be a positive integer"));
    }
    let store = SqliteStore::new(conn);
    let student = require_student(&store, ctx, student_id)?;
    let entry = RewardEntry {
        id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        student_id: student.id,
        points,
        reason: reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string),
        awarded_at,
    };
    conn.execute(
        "INSERT INTO reward_points(id, tenant_id, student_id, points, reason, awarded_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        params![
            entry.id,
            entry.tenant_id,
            entry.student_id,
            entry.points,
            entry.reason,
            entry.awarded_at
        ],
    )?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, StudentFilter};
    use chrono::NaiveDate;

    #[test]
    fn student_needs_a_class_of_the_same_tenant() {
        let conn = crate::db::open_in_memory().unwrap();
        let a = TenantContext::new("tenant-a");
        let b = TenantContext::new("tenant-b");
        let class = create_class(&conn, &a, "Sunflowers", 12).unwrap();

        let e = create_student(&conn, &b, "Noor Aziz", Some(&class.id)).unwrap_err();
        assert_eq!(e.code(), "not_found");
        let s = create_student(&conn, &a, "  Noor Aziz ", Some(&class.id)).unwrap();
        assert_eq!(s.full_name, "Noor Aziz");
    }

    #[test]
    fn deactivated_students_drop_out_of_default_listing() {
        let conn = crate::db::open_in_memory().unwrap();
        let ctx = TenantContext::new("tenant-a");
        let s1 = create_student(&conn, &ctx, "Ada", None).unwrap();
        create_student(&conn, &ctx, "Ben", None).unwrap();
        set_student_active(&conn, &ctx, &s1.id, false).unwrap();

        let store = SqliteStore::new(&conn);
        let active = store.query_students("tenant-a", &StudentFilter::default()).unwrap();
        assert_eq!(active.len(), 1);
        let all = store
            .query_students(
                "tenant-a",
                &StudentFilter {
                    include_inactive: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn points_must_be_positive_and_are_queryable_by_day() {
        let conn = crate::db::open_in_memory().unwrap();
        let ctx = TenantContext::new("tenant-a");
        let s = create_student(&conn, &ctx, "Ada", None).unwrap();
        let when = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();

        assert!(award_points(&conn, &ctx, &s.id, 0, None, when).is_err());
        award_points(&conn, &ctx, &s.id, 5, Some("kindness"), when).unwrap();

        let store = SqliteStore::new(&conn);
        let day = DateRange::day(when.date());
        let rows = store.query_rewards("tenant-a", &day).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reason.as_deref(), Some("kindness"));
    }
}
