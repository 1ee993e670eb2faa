use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    Fee, FeeStatus, Student, TenantContext, Transaction, TransactionStatus, TransactionType,
    STUDENT_FEES_CATEGORY,
};
use crate::store::LedgerStore;

/// Loads a student the caller's tenant owns. A student of another tenant is
/// reported as forbidden, not as missing.
pub fn require_student<S: LedgerStore>(
    store: &S,
    ctx: &TenantContext,
    student_id: &str,
) -> LedgerResult<Student> {
    let student = store
        .find_student(student_id)?
        .ok_or_else(|| LedgerError::not_found("student", student_id))?;
    if student.tenant_id != ctx.tenant_id {
        return Err(LedgerError::Forbidden(format!(
            "student {} does not belong to tenant {}",
            student_id, ctx.tenant_id
        )));
    }
    Ok(student)
}

pub fn require_non_empty(value: &str, field: &str) -> LedgerResult<String> {
    let t = value.trim();
    if t.is_empty() {
        return Err(LedgerError::invalid(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

pub fn require_positive(amount: Decimal, field: &str) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid(format!(
            "{} must be greater than zero (got {})",
            field, amount
        )));
    }
    Ok(amount)
}

pub fn validate_discount(amount: Decimal, discount: Decimal) -> LedgerResult<()> {
    if discount < Decimal::ZERO {
        return Err(LedgerError::invalid("discount must not be negative"));
    }
    if discount > amount {
        return Err(LedgerError::invalid(format!(
            "discount {} exceeds amount {}",
            discount, amount
        )));
    }
    Ok(())
}

/// The journal entry that settles `fee`.
pub fn settlement_for(fee: &Fee, student_name: &str, paid_on: NaiveDate) -> Transaction {
    Transaction {
        id: Uuid::new_v4().to_string(),
        tenant_id: fee.tenant_id.clone(),
        kind: TransactionType::Income,
        category: STUDENT_FEES_CATEGORY.to_string(),
        amount: fee.net_amount(),
        description: format!("{} fee payment - {}", fee.fee_type, student_name),
        date: paid_on,
        reference_number: None,
        status: TransactionStatus::Completed,
        fee_id: Some(fee.id.clone()),
    }
}

/// Whether `fee` and the journal entries attributed to it satisfy the
/// reconciliation rule: paid if and only if exactly one completed
/// `student_fees` income entry for the net amount exists.
pub fn is_reconciled(fee: &Fee, attributed: &[Transaction]) -> bool {
    let settling = attributed
        .iter()
        .filter(|t| t.fee_id.as_deref() == Some(fee.id.as_str()))
        .filter(|t| {
            t.kind == TransactionType::Income
                && t.category == STUDENT_FEES_CATEGORY
                && t.status == TransactionStatus::Completed
                && t.amount == fee.net_amount()
        })
        .count();
    let has_any = attributed
        .iter()
        .any(|t| t.fee_id.as_deref() == Some(fee.id.as_str()));
    match fee.status {
        FeeStatus::Paid => settling == 1 && fee.payment_date.is_some(),
        FeeStatus::Pending | FeeStatus::Overdue => !has_any && fee.payment_date.is_none(),
    }
}
