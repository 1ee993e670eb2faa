//! Storage seam for the ledger.
//!
//! The ledger only ever finds a record by its key, inserts, updates, or
//! queries a tenant-scoped range. Anything that must commit as a unit runs
//! inside [`LedgerStore::atomically`].

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::NaiveDate;

use crate::error::LedgerResult;
use crate::model::{
    AttendanceEvent, Class, DateRange, Fee, FeeStatus, RewardEntry, Student, StudentFilter,
    Transaction,
};

#[derive(Debug, Clone, Default)]
pub struct FeeQuery {
    pub student_id: Option<String>,
    pub status: Option<FeeStatus>,
}

pub trait LedgerStore {
    /// Runs `f` so that every write it performs commits together or not at all.
    fn atomically<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Self) -> LedgerResult<T>;

    /// Unscoped on purpose: callers need to tell "missing" from "someone else's".
    fn find_student(&self, student_id: &str) -> LedgerResult<Option<Student>>;
    fn query_students(&self, tenant_id: &str, filter: &StudentFilter) -> LedgerResult<Vec<Student>>;
    fn query_classes(&self, tenant_id: &str) -> LedgerResult<Vec<Class>>;

    fn find_attendance(
        &self,
        tenant_id: &str,
        student_id: &str,
        date: NaiveDate,
    ) -> LedgerResult<Option<AttendanceEvent>>;
    /// Insert-or-update on (tenant, student, date); the stored row is returned.
    fn upsert_attendance(&self, event: &AttendanceEvent) -> LedgerResult<AttendanceEvent>;
    /// Insert only if the natural key is free. Returns whether a row was written.
    fn insert_attendance(&self, event: &AttendanceEvent) -> LedgerResult<bool>;
    fn update_attendance(&self, event: &AttendanceEvent) -> LedgerResult<()>;
    fn query_attendance(
        &self,
        tenant_id: &str,
        range: &DateRange,
        class_id: Option<&str>,
    ) -> LedgerResult<Vec<AttendanceEvent>>;

    fn insert_fee(&self, fee: &Fee) -> LedgerResult<()>;
    fn find_fee(&self, tenant_id: &str, fee_id: &str) -> LedgerResult<Option<Fee>>;
    /// Compare-and-set status update. Returns false when the stored status is
    /// not one of `from`, leaving the row untouched.
    fn update_fee_status(
        &self,
        tenant_id: &str,
        fee_id: &str,
        from: &[FeeStatus],
        to: FeeStatus,
        payment_date: Option<NaiveDate>,
    ) -> LedgerResult<bool>;
    fn query_fees(&self, tenant_id: &str, query: &FeeQuery) -> LedgerResult<Vec<Fee>>;

    fn insert_transaction(&self, txn: &Transaction) -> LedgerResult<()>;
    fn query_transactions(&self, tenant_id: &str, range: &DateRange) -> LedgerResult<Vec<Transaction>>;
    fn transactions_for_fee(&self, tenant_id: &str, fee_id: &str) -> LedgerResult<Vec<Transaction>>;

    fn query_rewards(&self, tenant_id: &str, range: &DateRange) -> LedgerResult<Vec<RewardEntry>>;
}
