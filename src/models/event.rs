use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event level, used by the presenter to pick a log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "info",
            EventLevel::Warning => "warning",
            EventLevel::Error => "error",
            EventLevel::Success => "success",
        }
    }
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    RoundStarted { round: u64, accounts: usize },
    PingSucceeded { status: u16, payload: serde_json::Value },
    PingFailed { message: String },
    RateLimited { wait_secs: u64 },
    RetryScheduled { attempt: u32, delay_secs: u64 },
    AccountFailed { attempts: u32, message: String },
    RoundWaiting { delay_secs: u64 },
    ProxyDisabled { reason: String },
    ShutdownNotice,
}

/// Timestamped record emitted by the polling engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingEvent {
    pub timestamp: DateTime<Utc>,
    /// Truncated account identifier, absent for scheduler-wide events
    pub account: Option<String>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl PingEvent {
    pub fn new(account: Option<String>, kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            account,
            kind,
        }
    }

    pub fn level(&self) -> EventLevel {
        match self.kind {
            EventKind::PingSucceeded { .. } => EventLevel::Success,
            EventKind::PingFailed { .. } | EventKind::AccountFailed { .. } => EventLevel::Error,
            EventKind::RateLimited { .. }
            | EventKind::RetryScheduled { .. }
            | EventKind::ProxyDisabled { .. }
            | EventKind::ShutdownNotice => EventLevel::Warning,
            EventKind::RoundStarted { .. } | EventKind::RoundWaiting { .. } => EventLevel::Info,
        }
    }
}

/// Fire-and-forget sender for [`PingEvent`]s.
///
/// Backed by a bounded broadcast channel; emitting never blocks and a
/// missing or absent subscriber is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<broadcast::Sender<PingEvent>>,
}

impl EventSink {
    pub fn new(sender: broadcast::Sender<PingEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, account: Option<&str>, kind: EventKind) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(PingEvent::new(account.map(str::to_string), kind));
        }
    }
}
