use chrono::{Local, NaiveDate};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::{FeeQuery, LedgerStore};
use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    AttendanceEvent, AttendanceStatus, Class, DateRange, Fee, FeeStatus, RewardEntry, Student,
    StudentFilter, Transaction, TransactionStatus, TransactionType,
};

macro_rules! sql_text_enum {
    ($($t:ty),+ $(,)?) => {
        $(
            impl ToSql for $t {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $t {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: LedgerError| FromSqlError::Other(Box::new(e)))
                }
            }
        )+
    };
}

sql_text_enum!(AttendanceStatus, FeeStatus, TransactionType, TransactionStatus);

const STUDENT_COLS: &str = "id, tenant_id, full_name, class_id, is_active";
const ATTENDANCE_COLS: &str = "id, tenant_id, student_id, class_id, date, status, check_in_time,
     check_out_time, late_minutes, notes, marked_by, updated_at";
const FEE_COLS: &str =
    "id, tenant_id, student_id, amount, discount, fee_type, due_date, status, payment_date, notes";
const TXN_COLS: &str =
    "id, tenant_id, type, category, amount, description, date, reference_number, status, fee_id";

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(raw.trim())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        full_name: r.get(2)?,
        class_id: r.get(3)?,
        is_active: r.get::<_, i64>(4)? != 0,
    })
}

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<AttendanceEvent> {
    Ok(AttendanceEvent {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        student_id: r.get(2)?,
        class_id: r.get(3)?,
        date: r.get(4)?,
        status: r.get(5)?,
        check_in_time: r.get(6)?,
        check_out_time: r.get(7)?,
        late_minutes: r.get(8)?,
        notes: r.get(9)?,
        marked_by: r.get(10)?,
        updated_at: r.get(11)?,
    })
}

fn fee_from_row(r: &Row<'_>) -> rusqlite::Result<Fee> {
    Ok(Fee {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        student_id: r.get(2)?,
        amount: decimal_at(r, 3)?,
        discount: decimal_at(r, 4)?,
        fee_type: r.get(5)?,
        due_date: r.get(6)?,
        status: r.get(7)?,
        payment_date: r.get(8)?,
        notes: r.get(9)?,
    })
}

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        tenant_id: r.get(1)?,
        kind: r.get(2)?,
        category: r.get(3)?,
        amount: decimal_at(r, 4)?,
        description: r.get(5)?,
        date: r.get(6)?,
        reference_number: r.get(7)?,
        status: r.get(8)?,
        fee_id: r.get(9)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

/// [`LedgerStore`] over a workspace SQLite connection.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl LedgerStore for SqliteStore<'_> {
    fn atomically<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Self) -> LedgerResult<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        // Dropping `tx` on the error path rolls everything back.
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    fn find_student(&self, student_id: &str) -> LedgerResult<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLS);
        Ok(self
            .conn
            .query_row(&sql, [student_id], student_from_row)
            .optional()?)
    }

    fn query_students(&self, tenant_id: &str, filter: &StudentFilter) -> LedgerResult<Vec<Student>> {
        let sql = format!(
            "SELECT {} FROM students
             WHERE tenant_id = ?1 AND (?2 IS NULL OR class_id = ?2)
             ORDER BY full_name COLLATE NOCASE, id",
            STUDENT_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant_id, filter.class_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().filter(|s| filter.matches(s)).collect())
    }

    fn query_classes(&self, tenant_id: &str) -> LedgerResult<Vec<Class>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, name, capacity FROM classes
             WHERE tenant_id = ?
             ORDER BY name COLLATE NOCASE, id",
        )?;
        let rows = stmt
            .query_map([tenant_id], |r| {
                Ok(Class {
                    id: r.get(0)?,
                    tenant_id: r.get(1)?,
                    name: r.get(2)?,
                    capacity: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_attendance(
        &self,
        tenant_id: &str,
        student_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<AttendanceEvent>> {
        let sql = format!(
            "SELECT {} FROM attendance_events
             WHERE tenant_id = ? AND student_id = ? AND date = ?",
            ATTENDANCE_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, params![tenant_id, student_id, date], attendance_from_row)
            .optional()?)
    }

    fn upsert_attendance(&self, event: &AttendanceEvent) -> LedgerResult<AttendanceEvent> {
        self.conn.execute(
            "INSERT INTO attendance_events(
                id, tenant_id, student_id, class_id, date, status, check_in_time,
                check_out_time, late_minutes, notes, marked_by, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(tenant_id, student_id, date) DO UPDATE SET
               class_id = excluded.class_id,
               status = excluded.status,
               check_in_time = excluded.check_in_time,
               check_out_time = excluded.check_out_time,
               late_minutes = excluded.late_minutes,
               notes = excluded.notes,
               marked_by = excluded.marked_by,
               updated_at = excluded.updated_at",
            params![
                event.id,
                event.tenant_id,
                event.student_id,
                event.class_id,
                event.date,
                event.status,
                event.check_in_time,
                event.check_out_time,
                event.late_minutes,
                event.notes,
                event.marked_by,
                event.updated_at,
            ],
        )?;
        self.find_attendance(&event.tenant_id, &event.student_id, event.date)?
            .ok_or_else(|| LedgerError::storage("attendance row vanished after upsert"))
    }

    fn insert_attendance(&self, event: &AttendanceEvent) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "INSERT INTO attendance_events(
                id, tenant_id, student_id, class_id, date, status, check_in_time,
                check_out_time, late_minutes, notes, marked_by, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(tenant_id, student_id, date) DO NOTHING",
            params![
                event.id,
                event.tenant_id,
                event.student_id,
                event.class_id,
                event.date,
                event.status,
                event.check_in_time,
                event.check_out_time,
                event.late_minutes,
                event.notes,
                event.marked_by,
                event.updated_at,
            ],
        )?;
        Ok(changed == 1)
    }

    fn update_attendance(&self, event: &AttendanceEvent) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE attendance_events SET
               status = ?1, check_in_time = ?2, check_out_time = ?3, late_minutes = ?4,
               notes = ?5, marked_by = ?6, updated_at = ?7
             WHERE id = ?8 AND tenant_id = ?9",
            params![
                event.status,
                event.check_in_time,
                event.check_out_time,
                event.late_minutes,
                event.notes,
                event.marked_by,
                event.updated_at,
                event.id,
                event.tenant_id,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found("attendance", event.id.clone()));
        }
        Ok(())
    }

    fn query_attendance(
        &self,
        tenant_id: &str,
        range: &DateRange,
        class_id: Option<&str>,
    ) -> LedgerResult<Vec<AttendanceEvent>> {
        let sql = format!(
            "SELECT {} FROM attendance_events
             WHERE tenant_id = ?1 AND date >= ?2 AND date <= ?3
               AND (?4 IS NULL OR class_id = ?4)
             ORDER BY date, student_id",
            ATTENDANCE_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![tenant_id, range.start, range.end, class_id],
                attendance_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_fee(&self, fee: &Fee) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO fees(
                id, tenant_id, student_id, amount, discount, fee_type, due_date,
                status, payment_date, notes, created_at)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                fee.id,
                fee.tenant_id,
                fee.student_id,
                fee.amount.to_string(),
                fee.discount.to_string(),
                fee.fee_type,
                fee.due_date,
                fee.status,
                fee.payment_date,
                fee.notes,
                Local::now().naive_local(),
            ],
        )?;
        Ok(())
    }

    fn find_fee(&self, tenant_id: &str, fee_id: &str) -> LedgerResult<Option<Fee>> {
        let sql = format!(
            "SELECT {} FROM fees WHERE tenant_id = ? AND id = ?",
            FEE_COLS
        );
        Ok(self
            .conn
            .query_row(&sql, [tenant_id, fee_id], fee_from_row)
            .optional()?)
    }

    fn update_fee_status(
        &self,
        tenant_id: &str,
        fee_id: &str,
        from: &[FeeStatus],
        to: FeeStatus,
        payment_date: Option<NaiveDate>,
    ) -> LedgerResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE fees SET status = ?, payment_date = ?, updated_at = ?
             WHERE tenant_id = ? AND id = ? AND status IN ({})",
            placeholders
        );
        let now = Local::now().naive_local();
        let mut values: Vec<&dyn ToSql> = vec![&to, &payment_date, &now, &tenant_id, &fee_id];
        for s in from {
            values.push(s);
        }
        let changed = self.conn.execute(&sql, values.as_slice())?;
        Ok(changed == 1)
    }

    fn query_fees(&self, tenant_id: &str, query: &FeeQuery) -> LedgerResult<Vec<Fee>> {
        let sql = format!(
            "SELECT {} FROM fees
             WHERE tenant_id = ?1
               AND (?2 IS NULL OR student_id = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY due_date, id",
            FEE_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![tenant_id, query.student_id, query.status],
                fee_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_transaction(&self, txn: &Transaction) -> LedgerResult<()> {
        self.conn
            .execute(
                "INSERT INTO transactions(
                    id, tenant_id, type, category, amount, description, date,
                    reference_number, status, fee_id, created_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    txn.id,
                    txn.tenant_id,
                    txn.kind,
                    txn.category,
                    txn.amount.to_string(),
                    txn.description,
                    txn.date,
                    txn.reference_number,
                    txn.status,
                    txn.fee_id,
                    Local::now().naive_local(),
                ],
            )
            .map_err(|e| match &txn.fee_id {
                Some(fee_id) if is_constraint_violation(&e) => {
                    LedgerError::Conflict(format!("fee {} is already settled", fee_id))
                }
                _ => LedgerError::from(e),
            })?;
        Ok(())
    }

    fn query_transactions(&self, tenant_id: &str, range: &DateRange) -> LedgerResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions
             WHERE tenant_id = ? AND date >= ? AND date <= ?
             ORDER BY date, created_at, id",
            TXN_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant_id, range.start, range.end], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn transactions_for_fee(&self, tenant_id: &str, fee_id: &str) -> LedgerResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE tenant_id = ? AND fee_id = ? ORDER BY id",
            TXN_COLS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([tenant_id, fee_id], transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_rewards(&self, tenant_id: &str, range: &DateRange) -> LedgerResult<Vec<RewardEntry>> {
        // awarded_at is a timestamp; compare on its calendar-day prefix.
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, student_id, points, reason, awarded_at FROM reward_points
             WHERE tenant_id = ? AND substr(awarded_at, 1, 10) >= ? AND substr(awarded_at, 1, 10) <= ?
             ORDER BY awarded_at, id",
        )?;
        let rows = stmt
            .query_map(params![tenant_id, range.start, range.end], |r| {
                Ok(RewardEntry {
                    id: r.get(0)?,
                    tenant_id: r.get(1)?,
                    student_id: r.get(2)?,
                    points: r.get(3)?,
                    reason: r.get(4)?,
                    awarded_at: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
