//! Out-of-band notifications.
//!
//! Ledger writes never call the dispatcher directly. They emit an intent into
//! a [`NoticeSink`] after their write has committed; the [`Outbox`] hands it to
//! a worker thread which delivers it and logs failures. Payment reminders are
//! the exception: the caller waits on [`deliver_with_timeout`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::NotifierMode;
use crate::model::AttendanceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    AttendanceStatus,
    PaymentReminder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub tenant_id: String,
    pub student_id: String,
    pub kind: TemplateKind,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn attendance(
        tenant_id: &str,
        student_id: &str,
        status: AttendanceStatus,
        date: NaiveDate,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            student_id: student_id.to_string(),
            kind: TemplateKind::AttendanceStatus,
            payload: json!({
                "status": status.as_str(),
                "date": date.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Delivery {
    pub fn delivered() -> Self {
        Self {
            delivered: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            delivered: false,
            error: Some(error.into()),
        }
    }
}

pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, notification: &Notification) -> Delivery;
}

/// Writes every notification to the log and reports it delivered. Used when no
/// messaging gateway is attached to the daemon.
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn send(&self, n: &Notification) -> Delivery {
        tracing::info!(
            tenant_id = %n.tenant_id,
            student_id = %n.student_id,
            kind = ?n.kind,
            payload = %n.payload,
            "notification dispatched"
        );
        Delivery::delivered()
    }
}

pub struct DisabledDispatcher;

impl NotificationDispatcher for DisabledDispatcher {
    fn send(&self, _: &Notification) -> Delivery {
        Delivery::failed("notification delivery is disabled")
    }
}

pub fn dispatcher_for(mode: NotifierMode) -> Arc<dyn NotificationDispatcher> {
    match mode {
        NotifierMode::Log => Arc::new(LogDispatcher),
        NotifierMode::Disabled => Arc::new(DisabledDispatcher),
    }
}

/// Accepts intents emitted after a successful write. Must never fail the caller.
pub trait NoticeSink {
    fn emit(&self, notification: Notification);
}

#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Notification>,
}

impl NoticeSink for Outbox {
    fn emit(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::warn!(
                student_id = %e.0.student_id,
                "notification worker is gone; dropping notification"
            );
        }
    }
}

/// Starts the delivery worker. It exits once every [`Outbox`] clone is dropped
/// and the queue has drained.
pub fn spawn_worker(dispatcher: Arc<dyn NotificationDispatcher>) -> (Outbox, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<Notification>();
    let handle = thread::spawn(move || {
        for n in rx {
            let delivery = dispatcher.send(&n);
            if !delivery.delivered {
                tracing::warn!(
                    tenant_id = %n.tenant_id,
                    student_id = %n.student_id,
                    kind = ?n.kind,
                    error = delivery.error.as_deref().unwrap_or("unknown"),
                    "notification delivery failed"
                );
            }
        }
        tracing::debug!("notification worker stopped");
    });
    (Outbox { tx }, handle)
}

/// Sends synchronously but gives up after `timeout`, reporting the timeout as
/// a failed delivery. A dispatcher that hangs keeps its thread; the caller does not wait on it.
pub fn deliver_with_timeout(
    dispatcher: &Arc<dyn NotificationDispatcher>,
    notification: Notification,
    timeout: Duration,
) -> Delivery {
    let (tx, rx) = mpsc::channel();
    let dispatcher = Arc::clone(dispatcher);
    thread::spawn(move || {
        let _ = tx.send(dispatcher.send(&notification));
    });
    match rx.recv_timeout(timeout) {
        Ok(delivery) => delivery,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            Delivery::failed(format!("delivery timed out after {} ms", timeout.as_millis()))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Delivery::failed("dispatcher panicked"),
    }
}

#[cfg(test)]
pub(crate) use test_support::RecordingSink;
