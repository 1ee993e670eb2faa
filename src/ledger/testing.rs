//! Fixtures shared by the ledger unit tests.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    AttendanceEvent, Class, DateRange, Fee, FeeStatus, RewardEntry, Student, StudentFilter,
    TenantContext, Transaction,
};
use crate::roster;
use crate::store::{FeeQuery, LedgerStore, SqliteStore};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    day(y, m, d).and_hms_opt(h, min, 0).expect("valid time")
}

pub struct World {
    pub ctx: TenantContext,
    pub class_id: String,
    pub students: Vec<String>,
}

/// A fresh tenant with one class and `n` active students in it.
pub fn seed(conn: &Connection, n: usize) -> World {
    let ctx = TenantContext::new(format!("tenant-{}", Uuid::new_v4())).with_actor("staff-1");
    let class = roster::create_class(conn, &ctx, "Butterflies", 20).expect("class");
    let students = (0..n)
        .map(|i| {
            roster::create_student(conn, &ctx, &format!("Child {:02}", i), Some(&class.id))
                .expect("student")
                .id
        })
        .collect();
    World {
        ctx,
        class_id: class.id,
        students,
    }
}

/// Delegates to SQLite but fails chosen writes on demand.
pub struct FlakyStore<'c> {
    inner: SqliteStore<'c>,
    pub fail_attendance_insert_for: Option<String>,
    pub fail_fee_update: bool,
    pub fail_transaction_insert: bool,
    /// Lands a rival first mark just before each upsert.
    pub rival_attendance_insert: bool,
}

impl<'c> FlakyStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            inner: SqliteStore::new(conn),
            fail_attendance_insert_for: None,
            fail_fee_update: false,
            fail_transaction_insert: false,
            rival_attendance_insert: false,
        }
    }
}

impl LedgerStore for FlakyStore<'_> {
    fn atomically<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Self) -> LedgerResult<T>,
    {
        self.inner.atomically(|_| f(self))
    }

    fn find_student(&self, student_id: &str) -> LedgerResult<Option<Student>> {
        self.inner.find_student(student_id)
    }

    fn query_students(&self, tenant_id: &str, filter: &StudentFilter) -> LedgerResult<Vec<Student>> {
        self.inner.query_students(tenant_id, filter)
    }

    fn query_classes(&self, tenant_id: &str) -> LedgerResult<Vec<Class>> {
        self.inner.query_classes(tenant_id)
    }

    fn find_attendance(
        &self,
        tenant_id: &str,
        student_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<AttendanceEvent>> {
        self.inner.find_attendance(tenant_id, student_id, date)
    }

    fn upsert_attendance(&self, event: &AttendanceEvent) -> LedgerResult<AttendanceEvent> {
        if self.rival_attendance_insert {
            let rival = AttendanceEvent {
                id: Uuid::new_v4().to_string(),
                ..event.clone()
            };
            self.inner.insert_attendance(&rival)?;
        }
        self.inner.upsert_attendance(event)
    }

    fn insert_attendance(&self, event: &AttendanceEvent) -> LedgerResult<bool> {
        if self.fail_attendance_insert_for.as_deref() == Some(event.student_id.as_str()) {
            return Err(LedgerError::storage("injected attendance insert failure"));
        }
        self.inner.insert_attendance(event)
    }

    fn update_attendance(&self, event: &AttendanceEvent) -> LedgerResult<()> {
        self.inner.update_attendance(event)
    }

    fn query_attendance(
        &self,
        tenant_id: &str,
        range: &DateRange,
        class_id: Option<&str>,
    ) -> LedgerResult<Vec<AttendanceEvent>> {
        self.inner.query_attendance(tenant_id, range, class_id)
    }

    fn insert_fee(&self, fee: &Fee) -> LedgerResult<()> {
        self.inner.insert_fee(fee)
    }

    fn find_fee(&self, tenant_id: &str, fee_id: &str) -> LedgerResult<Option<Fee>> {
        self.inner.find_fee(tenant_id, fee_id)
    }

    fn update_fee_status(
        &self,
        tenant_id: &str,
        fee_id: &str,
        from: &[FeeStatus],
        to: FeeStatus,
        payment_date: Option<NaiveDate>,
    ) -> LedgerResult<bool> {
        if self.fail_fee_update {
            return Err(LedgerError::storage("injected fee update failure"));
        }
        self.inner
            .update_fee_status(tenant_id, fee_id, from, to, payment_date)
    }

    fn query_fees(&self, tenant_id: &str, query: &FeeQuery) -> LedgerResult<Vec<Fee>> {
        self.inner.query_fees(tenant_id, query)
    }

    fn insert_transaction(&self, txn: &Transaction) -> LedgerResult<()> {
        if self.fail_transaction_insert {
            return Err(LedgerError::storage("injected transaction insert failure"));
        }
        self.inner.insert_transaction(txn)
    }

    fn query_transactions(&self, tenant_id: &str, range: &DateRange) -> LedgerResult<Vec<Transaction>> {
        self.inner.query_transactions(tenant_id, range)
    }

    fn transactions_for_fee(&self, tenant_id: &str, fee_id: &str) -> LedgerResult<Vec<Transaction>> {
        self.inner.transactions_for_fee(tenant_id, fee_id)
    }

    fn query_rewards(&self, tenant_id: &str, range: &DateRange) -> LedgerResult<Vec<RewardEntry>> {
        self.inner.query_rewards(tenant_id, range)
    }
}
