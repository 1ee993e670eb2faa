use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::validate::{
    is_reconciled, require_non_empty, require_positive, require_student, settlement_for,
    validate_discount,
};
use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    DateRange, Fee, FeeStatus, TenantContext, Transaction, TransactionStatus, TransactionType,
    STUDENT_FEES_CATEGORY,
};
use crate::notify::{deliver_with_timeout, Delivery, Notification, NotificationDispatcher, TemplateKind};
use crate::store::{FeeQuery, LedgerStore};

#[derive(Debug, Clone)]
pub struct NewFee {
    pub student_id: String,
    pub amount: Decimal,
    pub fee_type: String,
    pub due_date: NaiveDate,
    pub discount: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionType,
    pub category: String,
    pub amount: Decimal,
    pub description: String,
    pub reference_number: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub fee: Fee,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLedgerView {
    pub fee: Fee,
    pub effective_status: FeeStatus,
    pub settlement: Option<Transaction>,
    pub reconciled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialStats {
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub pending_fees: Decimal,
    pub overdue_fees: Decimal,
    pub monthly_income: Decimal,
    pub monthly_expenses: Decimal,
}

pub fn create_fee<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    input: NewFee,
) -> LedgerResult<Fee> {
    let amount = require_positive(input.amount, "amount")?;
    validate_discount(amount, input.discount)?;
    let fee_type = require_non_empty(&input.fee_type, "feeType")?;
    let student = require_student(store, ctx, &input.student_id)?;

    let fee = Fee {
        id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        student_id: student.id,
        amount,
        discount: input.discount,
        fee_type,
        due_date: input.due_date,
        status: FeeStatus::Pending,
        payment_date: None,
        notes: input.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    };
    store.insert_fee(&fee)?;
    tracing::debug!(tenant_id = %ctx.tenant_id, fee_id = %fee.id, amount = %fee.amount, "fee created");
    Ok(fee)
}

fn require_fee<S: LedgerStore>(store: &S, ctx: &TenantContext, fee_id: &str) -> LedgerResult<Fee> {
    store
        .find_fee(&ctx.tenant_id, fee_id)?
        .ok_or_else(|| LedgerError::not_found("fee", fee_id))
}

/// Settles a fee: flips it to paid and journals exactly one income entry for
/// its net amount. Both writes commit together or neither does.
pub fn mark_paid<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    fee_id: &str,
    today: NaiveDate,
) -> LedgerResult<Settlement> {
    let fee = require_fee(store, ctx, fee_id)?;
    if fee.status == FeeStatus::Paid {
        return Err(LedgerError::Conflict(format!("fee {} is already paid", fee.id)));
    }
    let student_name = store
        .find_student(&fee.student_id)?
        .map(|s| s.full_name)
        .unwrap_or_else(|| fee.student_id.clone());
    let transaction = settlement_for(&fee, &student_name, today);

    let written = store.atomically(|s| {
        let flipped = s.update_fee_status(
            &ctx.tenant_id,
            &fee.id,
            &[FeeStatus::Pending, FeeStatus::Overdue],
            FeeStatus::Paid,
            Some(today),
        )?;
        if !flipped {
            // Someone settled it between our read and this write.
            return Err(LedgerError::Conflict(format!("fee {} is already paid", fee.id)));
        }
        s.insert_transaction(&transaction)
    });
    if let Err(e) = &written {
        if matches!(e, LedgerError::DependencyFailure { .. }) {
            tracing::error!(tenant_id = %ctx.tenant_id, fee_id = %fee.id, error = %e, "fee settlement rolled back");
        }
    }
    written?;

    tracing::debug!(
        tenant_id = %ctx.tenant_id,
        fee_id = %fee.id,
        transaction_id = %transaction.id,
        amount = %transaction.amount,
        actor = ?ctx.actor_id,
        role = ?ctx.actor_role,
        "fee settled"
    );
    Ok(Settlement {
        fee: Fee {
            status: FeeStatus::Paid,
            payment_date: Some(today),
            ..fee
        },
        transaction,
    })
}

/// Sends a reminder for an unpaid fee and waits for the outcome. Never
/// touches the fee; a failed delivery is returned to the caller.
pub fn send_payment_reminder<S: LedgerStore>(
    store: &S,
    dispatcher: &Arc<dyn NotificationDispatcher>,
    ctx: &TenantContext,
    fee_id: &str,
    today: NaiveDate,
    timeout: Duration,
) -> LedgerResult<Delivery> {
    let fee = require_fee(store, ctx, fee_id)?;
    if fee.status == FeeStatus::Paid {
        return Err(LedgerError::Conflict(format!(
            "fee {} is already paid; nothing to remind",
            fee.id
        )));
    }
    let student_name = store
        .find_student(&fee.student_id)?
        .map(|s| s.full_name)
        .unwrap_or_default();
    let notification = Notification {
        tenant_id: ctx.tenant_id.clone(),
        student_id: fee.student_id.clone(),
        kind: TemplateKind::PaymentReminder,
        payload: json!({
            "feeId": fee.id,
            "feeType": fee.fee_type,
            "studentName": student_name,
            "amountDue": fee.net_amount().to_string(),
            "dueDate": fee.due_date.to_string(),
            "overdue": fee.effective_status(today) == FeeStatus::Overdue,
        }),
    };

    let delivery = deliver_with_timeout(dispatcher, notification, timeout);
    if !delivery.delivered {
        let reason = delivery.error.unwrap_or_else(|| "not delivered".to_string());
        tracing::warn!(tenant_id = %ctx.tenant_id, fee_id = %fee.id, error = %reason, "payment reminder failed");
        return Err(LedgerError::notifier(reason));
    }
    Ok(delivery)
}

/// Direct journal entry for anything that is not a fee settlement.
pub fn record_transaction<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    input: NewTransaction,
) -> LedgerResult<Transaction> {
    let amount = require_positive(input.amount, "amount")?;
    let category = require_non_empty(&input.category, "category")?.to_ascii_lowercase();
    if category == STUDENT_FEES_CATEGORY {
        return Err(LedgerError::invalid(
            "student_fees entries are created by settling a fee",
        ));
    }
    let txn = Transaction {
        id: Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        kind: input.kind,
        category,
        amount,
        description: input.description.trim().to_string(),
        date: input.date,
        reference_number: input
            .reference_number
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
        status: TransactionStatus::Completed,
        fee_id: None,
    };
    store.insert_transaction(&txn)?;
    tracing::debug!(
        tenant_id = %ctx.tenant_id,
        transaction_id = %txn.id,
        kind = txn.kind.as_str(),
        actor = ?ctx.actor_id,
        role = ?ctx.actor_role,
        "transaction recorded"
    );
    Ok(txn)
}

/// Persists the overdue classification for pending fees past their due date.
/// Returns how many fees changed.
pub fn refresh_overdue<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    today: NaiveDate,
) -> LedgerResult<usize> {
    let pending = store.query_fees(
        &ctx.tenant_id,
        &FeeQuery {
            status: Some(FeeStatus::Pending),
            ..Default::default()
        },
    )?;
    store.atomically(|s| {
        let mut changed = 0;
        for fee in pending.iter().filter(|f| f.due_date < today) {
            if s.update_fee_status(
                &ctx.tenant_id,
                &fee.id,
                &[FeeStatus::Pending],
                FeeStatus::Overdue,
                None,
            )? {
                changed += 1;
            }
        }
        Ok(changed)
    })
}

pub fn list_fees<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    query: &FeeQuery,
    today: NaiveDate,
) -> LedgerResult<Vec<FeeLedgerView>> {
    let fees = store.query_fees(&ctx.tenant_id, query)?;
    fees.into_iter()
        .map(|fee| {
            let attributed = store.transactions_for_fee(&ctx.tenant_id, &fee.id)?;
            Ok(FeeLedgerView {
                effective_status: fee.effective_status(today),
                reconciled: is_reconciled(&fee, &attributed),
                settlement: attributed.into_iter().next(),
                fee,
            })
        })
        .collect()
}

/// Pure roll-up over loaded records. Income and expense totals cover every
/// completed entry given; the `monthly_*` figures only those dated inside
/// `period`. Fee buckets use the read-time overdue classification.
pub fn compute_financial_stats(
    transactions: &[Transaction],
    fees: &[Fee],
    period: &DateRange,
    today: NaiveDate,
) -> FinancialStats {
    let mut stats = FinancialStats::default();
    for t in transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
    {
        let in_period = period.contains(t.date);
        match t.kind {
            TransactionType::Income => {
                stats.total_income += t.amount;
                if in_period {
                    stats.monthly_income += t.amount;
                }
            }
            TransactionType::Expense => {
                stats.total_expenses += t.amount;
                if in_period {
                    stats.monthly_expenses += t.amount;
                }
            }
        }
    }
    for f in fees {
        match f.effective_status(today) {
            FeeStatus::Pending => stats.pending_fees += f.amount,
            FeeStatus::Overdue => stats.overdue_fees += f.amount,
            FeeStatus::Paid => {}
        }
    }
    stats
}
