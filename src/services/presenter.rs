//! Event presenter
//!
//! Renders engine events as log lines. Runs as its own task and stops when
//! the event channel closes.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::models::{EventKind, EventLevel, PingEvent};

/// Human readable line for an event
pub fn render(event: &PingEvent) -> String {
    let account = event.account.as_deref().unwrap_or("-");
    match &event.kind {
        EventKind::RoundStarted { round, accounts } => {
            format!("Round {} started for {} accounts", round, accounts)
        }
        EventKind::PingSucceeded { status, payload } => {
            format!("[{}] PING ok, status: {}, data: {}", account, status, payload)
        }
        EventKind::PingFailed { message } => format!("[{}] PING error: {}", account, message),
        EventKind::RateLimited { wait_secs } => {
            format!("[{}] Rate limited, retrying in {}s", account, wait_secs)
        }
        EventKind::RetryScheduled {
            attempt,
            delay_secs,
        } => format!(
            "[{}] Attempt {} failed, retrying in {}s",
            account, attempt, delay_secs
        ),
        EventKind::AccountFailed { attempts, message } => format!(
            "[{}] Ping failed after {} attempts: {}",
            account, attempts, message
        ),
        EventKind::RoundWaiting { delay_secs } => {
            format!("Waiting {}s before the next round", delay_secs)
        }
        EventKind::ProxyDisabled { reason } => {
            format!("[{}] Proxy disabled, using direct connection: {}", account, reason)
        }
        EventKind::ShutdownNotice => "Shutting down gracefully".to_string(),
    }
}

/// Log every event until the channel closes
pub async fn run(mut rx: broadcast::Receiver<PingEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => present(&event),
            Err(RecvError::Lagged(n)) => {
                warn!("Event presenter lagged, missed {} events", n);
            }
            Err(RecvError::Closed) => {
                debug!("Event channel closed");
                break;
            }
        }
    }
}

fn present(event: &PingEvent) {
    let line = render(event);
    let timestamp = event.timestamp.format("%H:%M:%S");
    match event.level() {
        EventLevel::Error => error!(event = %event.level(), at = %timestamp, "{}", line),
        EventLevel::Warning => warn!(event = %event.level(), at = %timestamp, "{}", line),
        EventLevel::Info | EventLevel::Success => {
            info!(event = %event.level(), at = %timestamp, "{}", line)
        }
    }
}
