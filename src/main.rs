mod config;
mod db;
mod error;
mod ipc;
mod ledger;
mod model;
mod notify;
mod roster;
mod stats;
mod store;

use std::io::{self, BufRead, Write};

use tracing_subscriber::EnvFilter;

use crate::config::{LoggingSettings, Settings};

/// stdout carries responses, so every log line goes to stderr.
fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let (settings, config_error) = match Settings::load() {
        Ok(s) => (s, None),
        Err(e) => (Settings::default(), Some(e)),
    };
    init_tracing(&settings.logging);
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "invalid configuration; using defaults");
    }

    let dispatcher = notify::dispatcher_for(settings.notifications.mode);
    let (outbox, worker) = notify::spawn_worker(dispatcher.clone());

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        settings,
        outbox,
        dispatcher,
    };

    if let Some(path) = state.settings.workspace.clone() {
        match db::open_db(&path) {
            Ok(conn) => {
                tracing::info!(workspace = %path.display(), "workspace opened from settings");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => tracing::error!(workspace = %path.display(), error = ?e, "workspace open failed"),
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nurseryd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                let reply = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", reply);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    // Closing the outbox lets the worker drain queued notifications and exit.
    drop(state);
    if worker.join().is_err() {
        tracing::error!("notification worker panicked");
    }
}
