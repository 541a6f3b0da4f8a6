//! Account scheduler
//!
//! Polls every account once per round, in configured order, then sleeps a
//! randomized inter-round delay. Each account gets a small retry budget per
//! round; one account failing never stops the others.

use std::ops::Range;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::error::{PingerError, Result};
use crate::models::{Account, EventKind, EventSink};
use crate::ping::{ClientSettings, PingClient};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Poll attempts per account per round
    pub max_attempts: u32,
    /// Range of the wait between failed attempts
    pub retry_delay: Range<Duration>,
    /// Range of the wait between rounds
    pub round_delay: Range<Duration>,
    /// Stop after this many rounds (`None` runs until shutdown)
    pub max_rounds: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(30)..Duration::from_secs(60),
            round_delay: Duration::from_secs(240)..Duration::from_secs(360),
            max_rounds: None,
        }
    }
}

/// Classification of one poll attempt inside the retry wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Failed with attempts left
    Retrying,
    /// Failed on the last attempt
    Exhausted,
}

impl AttemptOutcome {
    pub fn classify<T>(result: &Result<T>, attempt: u32, max_attempts: u32) -> Self {
        match result {
            Ok(_) => AttemptOutcome::Success,
            Err(_) if attempt < max_attempts => AttemptOutcome::Retrying,
            Err(_) => AttemptOutcome::Exhausted,
        }
    }
}

/// Drives polling rounds over all accounts
pub struct AccountScheduler {
    clients: Vec<PingClient>,
    settings: SchedulerSettings,
    rng: StdRng,
    events: EventSink,
}

impl AccountScheduler {
    /// Create a scheduler over prepared clients.
    ///
    /// Fails with a configuration error when `clients` is empty.
    pub fn new(
        clients: Vec<PingClient>,
        settings: SchedulerSettings,
        events: EventSink,
    ) -> Result<Self> {
        if clients.is_empty() {
            return Err(no_accounts());
        }

        Ok(Self {
            clients,
            settings,
            rng: StdRng::from_entropy(),
            events,
        })
    }

    /// Create one HTTP client per account and a scheduler over them.
    ///
    /// The empty check happens before any client is built.
    pub fn from_accounts(
        accounts: &[Account],
        api_base: &str,
        client_settings: &ClientSettings,
        settings: SchedulerSettings,
        events: EventSink,
    ) -> Result<Self> {
        if accounts.is_empty() {
            return Err(no_accounts());
        }

        let clients = accounts
            .iter()
            .map(|account| {
                info!(
                    "Account {} configured (proxy: {})",
                    account.display_id(),
                    if account.proxy.is_some() { "yes" } else { "none" }
                );
                PingClient::for_account(account, api_base, client_settings.clone(), events.clone())
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(clients, settings, events)
    }

    /// Replace the random source used for retry and round delays
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn account_count(&self) -> usize {
        self.clients.len()
    }

    /// Run rounds until shutdown (or the configured round limit).
    ///
    /// Returns the number of rounds started. Shutdown is checked between
    /// accounts and interrupts the inter-round wait; an account already
    /// inside its retry wrapper is allowed to finish.
    #[instrument(skip(self, shutdown), fields(accounts = self.clients.len()))]
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!("Starting ping loop for {} accounts", self.clients.len());

        let mut round = 0u64;

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.round_limit_reached(round) {
                info!("Round limit of {} reached", round);
                break;
            }

            round += 1;
            self.events.emit(
                None,
                EventKind::RoundStarted {
                    round,
                    accounts: self.clients.len(),
                },
            );

            if !self.run_round(&shutdown).await || *shutdown.borrow() {
                break;
            }
            if self.round_limit_reached(round) {
                info!("Round limit of {} reached", round);
                break;
            }

            let delay = random_delay(&mut self.rng, &self.settings.round_delay);
            info!("Round {} complete, next round in {}s", round, delay.as_secs());
            self.events.emit(
                None,
                EventKind::RoundWaiting {
                    delay_secs: delay.as_secs(),
                },
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancelled(&mut shutdown) => {
                    debug!("Inter-round wait interrupted by shutdown");
                    break;
                }
            }
        }

        info!("Ping loop stopped after {} rounds", round);
        self.events.emit(None, EventKind::ShutdownNotice);
        round
    }

    /// Poll every account once, in order.
    ///
    /// Returns `false` if shutdown was observed before all accounts ran.
    pub async fn run_round(&mut self, shutdown: &watch::Receiver<bool>) -> bool {
        for client in self.clients.iter_mut() {
            if *shutdown.borrow() {
                info!("Shutdown requested, aborting round");
                return false;
            }
            ping_with_retry(client, &self.settings, &mut self.rng, &self.events).await;
        }
        true
    }

    fn round_limit_reached(&self, rounds: u64) -> bool {
        self.settings.max_rounds.is_some_and(|max| rounds >= max)
    }
}

/// Poll one account with the per-round retry budget
async fn ping_with_retry(
    client: &mut PingClient,
    settings: &SchedulerSettings,
    rng: &mut StdRng,
    events: &EventSink,
) -> AttemptOutcome {
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        info!("Pinging account {} (attempt {}/{})", client.account(), attempt, max_attempts);

        let result = client.ping().await;
        match AttemptOutcome::classify(&result, attempt, max_attempts) {
            AttemptOutcome::Success => return AttemptOutcome::Success,
            AttemptOutcome::Retrying => {
                let delay = random_delay(rng, &settings.retry_delay);
                warn!(
                    "Attempt {} for {} failed, retrying in {}s",
                    attempt,
                    client.account(),
                    delay.as_secs()
                );
                events.emit(
                    Some(client.account()),
                    EventKind::RetryScheduled {
                        attempt,
                        delay_secs: delay.as_secs(),
                    },
                );
                sleep(delay).await;
            }
            AttemptOutcome::Exhausted => {
                let message = result.err().map(|e| e.to_string()).unwrap_or_default();
                warn!(
                    "Account {} failed after {} attempts: {}",
                    client.account(),
                    attempt,
                    message
                );
                events.emit(
                    Some(client.account()),
                    EventKind::AccountFailed {
                        attempts: attempt,
                        message,
                    },
                );
                return AttemptOutcome::Exhausted;
            }
        }
    }
}

/// Uniform whole-second delay in `range`
fn random_delay(rng: &mut StdRng, range: &Range<Duration>) -> Duration {
    let (start, end) = (range.start.as_secs(), range.end.as_secs());
    if end <= start {
        return range.start;
    }
    Duration::from_secs(rng.gen_range(start..end))
}

/// Resolves once shutdown is requested; never resolves if the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn no_accounts() -> PingerError {
    PingerError::Configuration("at least one account is required".to_string())
}

/// Handle for stopping a running scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tokio::sync::broadcast;
    use tokio::time::Instant;

    use crate::models::PingEvent;
    use crate::ping::client::tests::{ok, status, too_many, ScriptedApi};

    type Calls = Arc<Mutex<Vec<Instant>>>;

    fn scripted(
        name: &str,
        script: Vec<Result<crate::ping::ApiResponse>>,
        events: &EventSink,
    ) -> (PingClient, Calls) {
        let api = ScriptedApi::new(script);
        let calls = api.calls.clone();
        let client = PingClient::new(name, Box::new(api), ClientSettings::default(), events.clone())
            .with_rng(StdRng::seed_from_u64(1));
        (client, calls)
    }

    fn scheduler(clients: Vec<PingClient>, max_rounds: Option<u64>, events: EventSink) -> AccountScheduler {
        let settings = SchedulerSettings {
            max_rounds,
            ..SchedulerSettings::default()
        };
        AccountScheduler::new(clients, settings, events)
            .unwrap()
            .with_rng(StdRng::seed_from_u64(2))
    }

    fn channel() -> (EventSink, broadcast::Receiver<PingEvent>) {
        let (tx, rx) = broadcast::channel(256);
        (EventSink::new(tx), rx)
    }

    fn drain(rx: &mut broadcast::Receiver<PingEvent>) -> Vec<PingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_classify_attempts() {
        let ok: Result<()> = Ok(());
        let err: Result<()> = Err(PingerError::Timeout);

        assert_eq!(AttemptOutcome::classify(&ok, 3, 3), AttemptOutcome::Success);
        assert_eq!(AttemptOutcome::classify(&err, 1, 3), AttemptOutcome::Retrying);
        assert_eq!(AttemptOutcome::classify(&err, 3, 3), AttemptOutcome::Exhausted);
    }

    #[test]
    fn test_random_delay_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        let range = Duration::from_secs(30)..Duration::from_secs(60);
        for _ in 0..200 {
            let delay = random_delay(&mut rng, &range);
            assert!(range.contains(&delay), "{:?}", delay);
        }

        let empty = Duration::from_secs(5)..Duration::from_secs(5);
        assert_eq!(random_delay(&mut rng, &empty), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_accounts_is_configuration_error() {
        let err = AccountScheduler::new(Vec::new(), SchedulerSettings::default(), EventSink::disabled())
            .err()
            .unwrap();
        assert!(matches!(err, PingerError::Configuration(_)));

        let err = AccountScheduler::from_accounts(
            &[],
            "http://127.0.0.1:1",
            &ClientSettings::default(),
            SchedulerSettings::default(),
            EventSink::disabled(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PingerError::Configuration(_)));
    }

    #[test]
    fn test_from_accounts_builds_one_client_per_account() {
        let accounts = vec![
            Account::new("token-aaaaaaaaaa", None),
            Account::new("token-bbbbbbbbbb", Some("socks5://127.0.0.1:1080".to_string())),
            Account::new("token-cccccccccc", Some("not a proxy".to_string())),
        ];
        let scheduler = AccountScheduler::from_accounts(
            &accounts,
            "http://127.0.0.1:1",
            &ClientSettings::default(),
            SchedulerSettings::default(),
            EventSink::disabled(),
        )
        .unwrap();
        assert_eq!(scheduler.account_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_stops_after_max_attempts() {
        let (events, mut rx) = channel();
        let (failing, failing_calls) = scripted(
            "bad...",
            vec![Err(PingerError::Timeout), Ok(status(500)), Err(PingerError::Network("x".into()))],
            &events,
        );
        let (healthy, healthy_calls) = scripted("good...", vec![Ok(ok())], &events);
        let mut scheduler = scheduler(vec![failing, healthy], Some(1), events);

        let (_handle, shutdown) = SchedulerHandle::new();
        assert_eq!(scheduler.run(shutdown).await, 1);

        assert_eq!(failing_calls.lock().unwrap().len(), 3);
        assert_eq!(healthy_calls.lock().unwrap().len(), 1);

        let events = drain(&mut rx);
        let retries: Vec<_> = events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::RetryScheduled { attempt, delay_secs } => Some((attempt, delay_secs)),
                _ => None,
            })
            .collect();
        assert_eq!(retries.len(), 2);
        assert_eq!(retries[0].0, 1);
        assert_eq!(retries[1].0, 2);
        assert!(retries.iter().all(|(_, d)| (30..60).contains(d)));

        assert!(events.iter().any(|e| {
            e.account.as_deref() == Some("bad...")
                && matches!(e.kind, EventKind::AccountFailed { attempts: 3, .. })
        }));
        assert!(events.iter().any(|e| {
            e.account.as_deref() == Some("good...")
                && matches!(e.kind, EventKind::PingSucceeded { .. })
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_do_not_consume_attempts() {
        let (events, mut rx) = channel();
        let (client, calls) = scripted(
            "acct...",
            vec![
                Ok(too_many(Some("1"))),
                Err(PingerError::Timeout),
                Ok(too_many(Some("1"))),
                Err(PingerError::Timeout),
                Ok(too_many(Some("1"))),
                Ok(ok()),
            ],
            &events,
        );
        let mut scheduler = scheduler(vec![client], Some(1), events);

        let (_handle, shutdown) = SchedulerHandle::new();
        scheduler.run(shutdown).await;

        assert_eq!(calls.lock().unwrap().len(), 6);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e.kind, EventKind::AccountFailed { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e.kind, EventKind::PingSucceeded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accounts_polled_in_configured_order() {
        let (events, mut rx) = channel();
        let (a, _) = scripted("a...", vec![], &events);
        let (b, _) = scripted("b...", vec![], &events);
        let (c, _) = scripted("c...", vec![], &events);
        let mut scheduler = scheduler(vec![a, b, c], Some(2), events);

        let (_handle, shutdown) = SchedulerHandle::new();
        assert_eq!(scheduler.run(shutdown).await, 2);

        let order: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e.kind, EventKind::PingSucceeded { .. }))
            .filter_map(|e| e.account)
            .collect();
        assert_eq!(order, vec!["a...", "b...", "c...", "a...", "b...", "c..."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rounds_are_separated_by_round_delay() {
        let (events, mut rx) = channel();
        let (client, calls) = scripted("acct...", vec![], &events);
        let mut scheduler = scheduler(vec![client], Some(3), events);

        let (_handle, shutdown) = SchedulerHandle::new();
        assert_eq!(scheduler.run(shutdown).await, 3);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_secs(240), "{:?}", gap);
            assert!(gap < Duration::from_secs(360), "{:?}", gap);
        }

        let events = drain(&mut rx);
        let waits = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::RoundWaiting { .. }))
            .count();
        assert_eq!(waits, 2);
        assert!(matches!(
            events.last().map(|e| &e.kind),
            Some(EventKind::ShutdownNotice)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_in_flight_retry_finish() {
        let (events, mut rx) = channel();
        let (first, first_calls) = scripted("first...", vec![Err(PingerError::Timeout), Ok(ok())], &events);
        let (second, second_calls) = scripted("second...", vec![], &events);
        let mut scheduler = scheduler(vec![first, second], None, events);

        let (handle, shutdown) = SchedulerHandle::new();
        let task = tokio::spawn(async move { scheduler.run(shutdown).await });

        // First account is now inside its 30-60s retry wait.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(first_calls.lock().unwrap().len(), 1);
        handle.shutdown();
        assert!(handle.is_shutdown());

        let rounds = task.await.unwrap();
        assert_eq!(rounds, 1);
        assert_eq!(first_calls.lock().unwrap().len(), 2);
        assert_eq!(second_calls.lock().unwrap().len(), 0);

        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e.kind, EventKind::RoundWaiting { .. })));
        assert!(matches!(
            events.last().map(|e| &e.kind),
            Some(EventKind::ShutdownNotice)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_last_account_skips_round_wait() {
        let (events, mut rx) = channel();
        let (client, calls) = scripted("only...", vec![Err(PingerError::Timeout), Ok(ok())], &events);
        let mut scheduler = scheduler(vec![client], None, events);

        let (handle, shutdown) = SchedulerHandle::new();
        let task = tokio::spawn(async move { scheduler.run(shutdown).await });

        sleep(Duration::from_secs(5)).await;
        handle.shutdown();

        assert_eq!(task.await.unwrap(), 1);
        assert_eq!(calls.lock().unwrap().len(), 2);

        let kinds: Vec<EventKind> = drain(&mut rx).into_iter().map(|e| e.kind).collect();
        assert!(!kinds
            .iter()
            .any(|k| matches!(k, EventKind::RoundWaiting { .. })));
        assert!(matches!(kinds[kinds.len() - 2], EventKind::PingSucceeded { .. }));
        assert!(matches!(kinds.last(), Some(EventKind::ShutdownNotice)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_round_wait() {
        let (events, _rx) = channel();
        let (client, calls) = scripted("acct...", vec![], &events);
        let mut scheduler = scheduler(vec![client], None, events);

        let (handle, shutdown) = SchedulerHandle::new();
        let start = Instant::now();
        let task = tokio::spawn(async move { scheduler.run(shutdown).await });

        sleep(Duration::from_secs(100)).await;
        handle.shutdown();

        assert_eq!(task.await.unwrap(), 1);
        assert!(Instant::now() - start < Duration::from_secs(240));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_starts_no_round() {
        let (events, _rx) = channel();
        let (client, calls) = scripted("acct...", vec![], &events);
        let mut scheduler = scheduler(vec![client], None, events);

        let (handle, shutdown) = SchedulerHandle::new();
        handle.shutdown();

        assert_eq!(scheduler.run(shutdown).await, 0);
        assert!(calls.lock().unwrap().is_empty());
    }
}
