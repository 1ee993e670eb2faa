//! Read-side aggregation over records already loaded for one tenant and one
//! window. Nothing here touches storage.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::ledger::attendance::{
    compute_statistics, percent, records_in_scope, AttendanceStatistics,
};
use crate::ledger::fees::{compute_financial_stats, FinancialStats};
use crate::model::{
    AttendanceEvent, Class, DateRange, Fee, RewardEntry, Student, Transaction, TransactionStatus,
    TransactionType,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAttendance {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub stats: AttendanceStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRollup {
    /// `YYYY-MM`
    pub month: String,
    pub income: Decimal,
    pub expenses: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub rank: usize,
    pub student_id: String,
    pub full_name: Option<String>,
    pub points: i64,
    pub first_awarded_at: NaiveDateTime,
}

/// Enrolled students as a whole percent of seats.
pub fn occupancy_rate(total_students: usize, total_capacity: usize) -> u32 {
    percent(total_students, total_capacity)
}

/// One entry per day that has any record, oldest first.
pub fn daily_trend(events: &[AttendanceEvent], students_in_scope: usize) -> Vec<DailyAttendance> {
    let mut by_day: BTreeMap<NaiveDate, Vec<AttendanceEvent>> = BTreeMap::new();
    for e in events {
        by_day.entry(e.date).or_default().push(e.clone());
    }
    by_day
        .into_iter()
        .map(|(date, rows)| DailyAttendance {
            date,
            stats: compute_statistics(&rows, students_in_scope),
        })
        .collect()
}

/// Rate over a multi-day window: on-site marks against every student-day that
/// had attendance taken.
pub fn range_attendance(events: &[AttendanceEvent], students_in_scope: usize) -> AttendanceStatistics {
    let days: BTreeSet<NaiveDate> = events.iter().map(|e| e.date).collect();
    compute_statistics(events, students_in_scope * days.len())
}

fn completed(transactions: &[Transaction]) -> impl Iterator<Item = &Transaction> {
    transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
}

pub fn monthly_rollup(transactions: &[Transaction]) -> Vec<MonthlyRollup> {
    let mut months: BTreeMap<(i32, u32), (Decimal, Decimal)> = BTreeMap::new();
    for t in completed(transactions) {
        let slot = months.entry((t.date.year(), t.date.month())).or_default();
        match t.kind {
            TransactionType::Income => slot.0 += t.amount,
            TransactionType::Expense => slot.1 += t.amount,
        }
    }
    months
        .into_iter()
        .map(|((y, m), (income, expenses))| MonthlyRollup {
            month: format!("{:04}-{:02}", y, m),
            income,
            expenses,
            net: income - expenses,
        })
        .collect()
}

/// Totals per (type, category); income first, then largest total.
pub fn category_breakdown(transactions: &[Transaction]) -> Vec<CategoryTotal> {
    let mut acc: HashMap<(TransactionType, &str), (Decimal, usize)> = HashMap::new();
    for t in completed(transactions) {
        let slot = acc.entry((t.kind, t.category.as_str())).or_default();
        slot.0 += t.amount;
        slot.1 += 1;
    }
    let mut out: Vec<CategoryTotal> = acc
        .into_iter()
        .map(|((kind, category), (total, count))| CategoryTotal {
            kind,
            category: category.to_string(),
            total,
            count,
        })
        .collect();
    out.sort_by(|a, b| {
        let kind_rank = |k: TransactionType| match k {
            TransactionType::Income => 0,
            TransactionType::Expense => 1,
        };
        kind_rank(a.kind)
            .cmp(&kind_rank(b.kind))
            .then_with(|| b.total.cmp(&a.total))
            .then_with(|| a.category.cmp(&b.category))
    });
    out
}

/// Top `n` students by summed reward points.
///
/// Ties go to the student whose first award in the window came earlier; a
/// remaining tie falls back to the student id so the order is total.
pub fn top_performers(rewards: &[RewardEntry], students: &[Student], n: usize) -> Vec<RankedStudent> {
    let mut totals: HashMap<&str, (i64, NaiveDateTime)> = HashMap::new();
    for r in rewards {
        totals
            .entry(r.student_id.as_str())
            .and_modify(|(points, first)| {
                *points += r.points;
                if r.awarded_at < *first {
                    *first = r.awarded_at;
                }
            })
            .or_insert((r.points, r.awarded_at));
    }
    let names: HashMap<&str, &str> = students
        .iter()
        .map(|s| (s.id.as_str(), s.full_name.as_str()))
        .collect();

    let mut ranked: Vec<(&str, i64, NaiveDateTime)> = totals
        .into_iter()
        .map(|(id, (points, first))| (id, points, first))
        .collect();
    ranked.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.2.cmp(&b.2).then_with(|| a.0.cmp(b.0)),
        other => other,
    });

    ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, (id, points, first))| RankedStudent {
            rank: i + 1,
            student_id: id.to_string(),
            full_name: names.get(id).map(|n| n.to_string()),
            points,
            first_awarded_at: first,
        })
        .collect()
}

/// Everything the dashboard needs, already scoped to one tenant and
/// (optionally) one class. `transactions` may reach back before `period`;
/// only the financial totals look at the older entries.
pub struct ReportInput<'a> {
    pub period: DateRange,
    pub today: NaiveDate,
    pub students: &'a [Student],
    pub classes: &'a [Class],
    pub attendance: &'a [AttendanceEvent],
    pub transactions: &'a [Transaction],
    pub fees: &'a [Fee],
    pub rewards: &'a [RewardEntry],
    pub top_n: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub period: DateRange,
    pub total_students: usize,
    pub total_capacity: usize,
    pub occupancy_rate: u32,
    pub attendance: AttendanceStatistics,
    pub daily_attendance: Vec<DailyAttendance>,
    pub financial: FinancialStats,
    pub monthly: Vec<MonthlyRollup>,
    pub categories: Vec<CategoryTotal>,
    pub top_performers: Vec<RankedStudent>,
}

pub fn build_dashboard(input: &ReportInput<'_>) -> Dashboard {
    let total_students = input.students.iter().filter(|s| s.is_active).count();
    let total_capacity: usize = input.classes.iter().map(|c| c.capacity as usize).sum();
    let attendance = records_in_scope(input.attendance, input.students);
    let in_period: Vec<Transaction> = input
        .transactions
        .iter()
        .filter(|t| input.period.contains(t.date))
        .cloned()
        .collect();
    Dashboard {
        period: input.period,
        total_students,
        total_capacity,
        occupancy_rate: occupancy_rate(total_students, total_capacity),
        attendance: range_attendance(&attendance, total_students),
        daily_attendance: daily_trend(&attendance, total_students),
        financial: compute_financial_stats(input.transactions, input.fees, &input.period, input.today),
        monthly: monthly_rollup(&in_period),
        categories: category_breakdown(&in_period),
        top_performers: top_performers(input.rewards, input.students, input.top_n),
    }
}
