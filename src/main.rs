//! NodeGo Pinger - Entry Point
//!
//! Loads accounts, starts the ping loop and stops it on Ctrl+C or SIGTERM.

use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nodego_pinger::config::LogConfig;
use nodego_pinger::models::{EventSink, PingEvent};
use nodego_pinger::services::{presenter, AccountScheduler, SchedulerHandle};
use nodego_pinger::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log);
    info!("Starting NodeGo pinger");

    let accounts = match config.load_accounts() {
        Ok(accounts) if accounts.is_empty() => {
            error!("At least one account is required");
            anyhow::bail!("no accounts configured");
        }
        Ok(accounts) => accounts,
        Err(e) => {
            error!("Failed to load accounts: {}", e);
            return Err(e.into());
        }
    };

    // Event channel (bounded to prevent memory leaks)
    let (event_tx, event_rx) = broadcast::channel::<PingEvent>(1024);
    let presenter_task = tokio::spawn(presenter::run(event_rx));

    let mut scheduler = AccountScheduler::from_accounts(
        &accounts,
        &config.api.base_url,
        &config.client_settings(),
        config.scheduler_settings(),
        EventSink::new(event_tx),
    )?;
    info!("Ping loop ready for {} accounts", scheduler.account_count());

    let (handle, shutdown) = SchedulerHandle::new();
    let mut scheduler_task = tokio::spawn(async move { scheduler.run(shutdown).await });

    tokio::select! {
        result = &mut scheduler_task => {
            match result {
                Ok(rounds) => info!("Ping loop finished after {} rounds", rounds),
                Err(e) => error!("Ping loop task failed: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            handle.shutdown();

            // Let an in-flight account finish within the grace period.
            if timeout(config.shutdown_grace(), &mut scheduler_task).await.is_err() {
                warn!(
                    "Ping loop still busy after {}s, exiting",
                    config.shutdown_grace().as_secs()
                );
                scheduler_task.abort();
            }
        }
    }

    // All event senders are gone once the scheduler is dropped.
    let _ = timeout(config.shutdown_grace(), presenter_task).await;

    info!("NodeGo pinger stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("nodego_pinger={}", log.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
