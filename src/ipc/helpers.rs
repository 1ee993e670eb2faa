use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::LedgerError;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{DateRange, TenantContext};

/// Runs `f` against the open workspace, or answers `no_workspace`.
pub fn with_db<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &AppState) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, state) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            tracing::debug!(method = %req.method, code = error.code, message = %error.message, "request failed");
            error.response(&req.id)
        }
    }
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn get_optional_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

pub fn get_optional_u64(params: &serde_json::Value, key: &str) -> Result<Option<u64>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-negative integer", key))),
    }
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD (got '{}')", key, raw)))
}

pub fn get_required_date(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = get_required_str(params, key)?;
    parse_date(key, &raw)
}

pub fn get_optional_date(params: &serde_json::Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    get_optional_str(params, key)
        .map(|raw| parse_date(key, &raw))
        .transpose()
}

/// Money arrives either as a JSON string ("450.00") or a JSON number.
pub fn get_optional_decimal(params: &serde_json::Value, key: &str) -> Result<Option<Decimal>, HandlerErr> {
    let text = match params.get(key) {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(_) => return Err(HandlerErr::bad_params(format!("{} must be a decimal amount", key))),
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| HandlerErr::bad_params(format!("{} is not a valid amount: '{}'", key, text)))
}

pub fn get_required_decimal(params: &serde_json::Value, key: &str) -> Result<Decimal, HandlerErr> {
    get_optional_decimal(params, key)?
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Parses one of the closed status/type enums.
pub fn get_required_enum<T>(params: &serde_json::Value, key: &str) -> Result<T, HandlerErr>
where
    T: FromStr<Err = LedgerError>,
{
    let raw = get_required_str(params, key)?;
    Ok(raw.parse::<T>()?)
}

pub fn get_optional_enum<T>(params: &serde_json::Value, key: &str) -> Result<Option<T>, HandlerErr>
where
    T: FromStr<Err = LedgerError>,
{
    match get_optional_str(params, key) {
        Some(raw) => Ok(Some(raw.parse::<T>()?)),
        None => Ok(None),
    }
}

pub fn tenant_context(params: &serde_json::Value) -> Result<TenantContext, HandlerErr> {
    let tenant_id = get_required_str(params, "tenantId")?;
    if tenant_id.trim().is_empty() {
        return Err(HandlerErr::bad_params("tenantId must not be empty"));
    }
    let mut ctx = TenantContext::new(tenant_id);
    if let Some(actor) = get_optional_str(params, "actorId") {
        ctx = ctx.with_actor(actor);
    }
    ctx.actor_role = get_optional_str(params, "actorRole");
    Ok(ctx)
}

/// `from`/`to` window; defaults to the current month up to `today`.
pub fn date_range(params: &serde_json::Value, today: NaiveDate) -> Result<DateRange, HandlerErr> {
    let from = get_optional_date(params, "from")?.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let to = get_optional_date(params, "to")?.unwrap_or(today);
    Ok(DateRange::new(from, to)?)
}
