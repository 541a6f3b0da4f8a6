//! Per-account polling client
//!
//! Enforces a minimum gap between requests and absorbs 429 responses with
//! server-directed, jittered backoff. Rate-limit waits happen inside
//! [`PingClient::ping`] and never reach the caller's retry budget.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use super::api::{random_user_agent, ApiResponse, HttpPingApi, PingApi};
use crate::error::{PingerError, Result};
use crate::models::{Account, EventKind, EventSink};
use crate::proxy::{ProxyTransport, TransportHandle};

/// Polling client configuration
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Minimum gap between two requests of the same account
    pub min_spacing: Duration,
    /// Request timeout
    pub request_timeout: Duration,
    /// Wait used when a 429 carries no usable Retry-After
    pub rate_limit_fallback: Duration,
    /// Upper bound (exclusive) of the random extra wait after a 429
    pub rate_limit_jitter: Duration,
    /// Largest server-directed wait honoured
    pub max_retry_after: Duration,
    /// 429 responses absorbed per call before giving up
    pub max_rate_limit_retries: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            rate_limit_fallback: Duration::from_secs(60),
            rate_limit_jitter: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(3600),
            max_rate_limit_retries: 100,
        }
    }
}

/// Time of the last successful request
#[derive(Debug, Clone, Copy, Default)]
pub struct PollState {
    last_request: Option<Instant>,
}

impl PollState {
    pub fn last_request(&self) -> Option<Instant> {
        self.last_request
    }

    /// Record a request; the stored time never moves backward
    pub fn record(&mut self, at: Instant) {
        self.last_request = Some(match self.last_request {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }

    /// Time left before the next request may go out
    pub fn remaining_cooldown(&self, min_spacing: Duration) -> Duration {
        self.last_request
            .map(|last| min_spacing.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO)
    }
}

/// Parse a `Retry-After` value into whole seconds.
///
/// Accepts delta-seconds and HTTP-dates; dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }

    if let Ok(secs) = value.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return Some(secs.floor() as u64);
        }
        return None;
    }

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| (date.with_timezone(&Utc) - now).num_seconds().max(0) as u64)
}

/// Polling client for one account
pub struct PingClient {
    account: String,
    api: Box<dyn PingApi>,
    settings: ClientSettings,
    state: PollState,
    rng: StdRng,
    events: EventSink,
}

impl PingClient {
    /// Create a client over any [`PingApi`]
    pub fn new(
        account: impl Into<String>,
        api: Box<dyn PingApi>,
        settings: ClientSettings,
        events: EventSink,
    ) -> Self {
        Self {
            account: account.into(),
            api,
            settings,
            state: PollState::default(),
            rng: StdRng::from_entropy(),
            events,
        }
    }

    /// Create the HTTP client for a configured account, routing it through
    /// the account's proxy when one is usable
    pub fn for_account(
        account: &Account,
        api_base: &str,
        settings: ClientSettings,
        events: EventSink,
    ) -> Result<Self> {
        let label = account.display_id();
        let transport = ProxyTransport::for_account(account.proxy.as_deref(), &label, &events);
        let api = build_with_direct_fallback(transport, &label, &events, |transport| {
            HttpPingApi::new(
                api_base,
                account.token.clone(),
                transport,
                settings.request_timeout,
            )
        })?;

        Ok(Self::new(label, Box::new(api), settings, events))
    }

    /// Replace the random source (user agents and jitter)
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Perform one logical check-in.
    ///
    /// 429 responses are retried here after the server-directed wait; any
    /// other failure is returned to the caller.
    #[instrument(skip(self), fields(account = %self.account))]
    pub async fn ping(&mut self) -> Result<Value> {
        let mut rate_limited = 0u32;

        loop {
            let cooldown = self.state.remaining_cooldown(self.settings.min_spacing);
            if !cooldown.is_zero() {
                debug!("Waiting {}ms before next request", cooldown.as_millis());
                sleep(cooldown).await;
            }

            let user_agent = random_user_agent(&mut self.rng);
            let result = self.api.ping(user_agent).await;

            match result {
                Ok(response) if response.is_success() => {
                    self.state.record(Instant::now());
                    info!("Check-in succeeded with status {}", response.status);
                    self.events.emit(
                        Some(self.account.as_str()),
                        EventKind::PingSucceeded {
                            status: response.status,
                            payload: response.body.clone(),
                        },
                    );
                    return Ok(response.body);
                }
                Ok(response) if response.is_rate_limited() => {
                    let retry_after_secs = self.retry_after_secs(&response);

                    if rate_limited >= self.settings.max_rate_limit_retries {
                        let err = PingerError::RateLimited { retry_after_secs };
                        return Err(self.fail(err));
                    }
                    rate_limited += 1;

                    let wait_secs = retry_after_secs + self.jitter_secs();
                    warn!(
                        "Rate limited, retrying in {}s ({}/{})",
                        wait_secs, rate_limited, self.settings.max_rate_limit_retries
                    );
                    self.events
                        .emit(Some(self.account.as_str()), EventKind::RateLimited { wait_secs });
                    sleep(Duration::from_secs(wait_secs)).await;
                }
                Ok(response) => {
                    let err = PingerError::Http {
                        status: response.status,
                        body: body_text(&response.body),
                    };
                    return Err(self.fail(err));
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn retry_after_secs(&self, response: &ApiResponse) -> u64 {
        response
            .retry_after
            .as_deref()
            .and_then(|value| parse_retry_after(value, Utc::now()))
            .unwrap_or(self.settings.rate_limit_fallback.as_secs())
            .min(self.settings.max_retry_after.as_secs())
    }

    fn jitter_secs(&mut self) -> u64 {
        let max = self.settings.rate_limit_jitter.as_secs();
        if max == 0 {
            0
        } else {
            self.rng.gen_range(0..max)
        }
    }

    fn fail(&mut self, err: PingerError) -> PingerError {
        warn!("Check-in failed: {}", err);
        self.events.emit(
            Some(self.account.as_str()),
            EventKind::PingFailed {
                message: err.to_string(),
            },
        );
        err
    }
}

/// Build an account's API client, retrying without the proxy when the
/// proxied client cannot be built
fn build_with_direct_fallback<T>(
    transport: Option<TransportHandle>,
    account: &str,
    events: &EventSink,
    build: impl Fn(Option<TransportHandle>) -> Result<T>,
) -> Result<T> {
    let Some(transport) = transport else {
        return build(None);
    };

    match build(Some(transport)) {
        Ok(api) => Ok(api),
        Err(e) => {
            warn!(account = %account, "Proxied client unavailable, using direct connection: {}", e);
            events.emit(
                Some(account),
                EventKind::ProxyDisabled {
                    reason: e.to_string(),
                },
            );
            build(None)
        }
    }
}

fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
