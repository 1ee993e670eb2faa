use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Settings;
use crate::notify::{NotificationDispatcher, Outbox};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub settings: Settings,
    /// Fire-and-forget notifications from ledger writes.
    pub outbox: Outbox,
    /// Synchronous deliveries (payment reminders).
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}
