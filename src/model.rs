use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LedgerError;

/// Journal category reserved for fee settlements.
pub const STUDENT_FEES_CATEGORY: &str = "student_fees";

/// Who is acting, and on behalf of which tenant. Supplied by the caller on
/// every ledger call; the ledger trusts it and does no authorization of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: String,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: None,
            actor_role: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }
}

/// Inclusive calendar-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, LedgerError> {
        if end < start {
            return Err(LedgerError::invalid(format!(
                "range end {} is before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

macro_rules! closed_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(LedgerError::invalid(format!(
                        "unknown {} '{}'",
                        $what, other
                    ))),
                }
            }
        }
    };
}

closed_enum!(AttendanceStatus, "attendance status", {
    Present => "present",
    Absent => "absent",
    Late => "late",
    Excused => "excused",
});

impl AttendanceStatus {
    /// Statuses that imply the child physically arrived.
    pub fn is_on_site(&self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

closed_enum!(FeeStatus, "fee status", {
    Pending => "pending",
    Paid => "paid",
    Overdue => "overdue",
});

closed_enum!(TransactionType, "transaction type", {
    Income => "income",
    Expense => "expense",
});

closed_enum!(TransactionStatus, "transaction status", {
    Completed => "completed",
    Pending => "pending",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub tenant_id: String,
    pub full_name: String,
    pub class_id: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class_id: Option<String>,
    /// Case-insensitive substring of the full name.
    pub search: Option<String>,
    pub include_inactive: bool,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        if !self.include_inactive && !student.is_active {
            return false;
        }
        if let Some(class_id) = &self.class_id {
            if student.class_id.as_deref() != Some(class_id.as_str()) {
                return false;
            }
        }
        if let Some(needle) = self.search.as_deref().map(str::trim) {
            if !needle.is_empty()
                && !student
                    .full_name
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub id: String,
    pub tenant_id: String,
    pub student_id: String,
    pub class_id: Option<String>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub check_in_time: Option<NaiveDateTime>,
    pub check_out_time: Option<NaiveDateTime>,
    pub late_minutes: u32,
    pub notes: Option<String>,
    pub marked_by: Option<String>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub id: String,
    pub tenant_id: String,
    pub student_id: String,
    pub amount: Decimal,
    pub discount: Decimal,
    pub fee_type: String,
    pub due_date: NaiveDate,
    pub status: FeeStatus,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl Fee {
    /// What the family actually owes.
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.discount
    }

    /// Read-time classification: a pending fee past its due date counts as
    /// overdue whether or not the stored status has caught up.
    pub fn effective_status(&self, today: NaiveDate) -> FeeStatus {
        match self.status {
            FeeStatus::Pending if self.due_date < today => FeeStatus::Overdue,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
    pub reference_number: Option<String>,
    pub status: TransactionStatus,
    /// Set only on the entry that settles a fee.
    pub fee_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEntry {
    pub id: String,
    pub tenant_id: String,
    pub student_id: String,
    pub points: i64,
    pub reason: Option<String>,
    pub awarded_at: NaiveDateTime,
}
