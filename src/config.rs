use crate::error::{PingerError, Result};
use crate::models::Account;
use crate::ping::{ClientSettings, DEFAULT_API_BASE};
use crate::services::SchedulerSettings;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote API configuration
    pub api: ApiConfig,
    /// Where accounts come from
    pub accounts: AccountsConfig,
    /// Polling loop configuration
    pub polling: PollingConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the check-in API (default: https://nodego.ai/api)
    pub base_url: String,
    /// Request timeout in seconds
    pub request_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct AccountsConfig {
    /// Accounts file, one `<token> [proxy]` per line
    pub file: PathBuf,
    /// Comma-separated tokens; takes precedence over the file
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Poll attempts per account per round
    pub max_attempts: u32,
    /// Stop after this many rounds
    pub max_rounds: Option<u64>,
    /// Seconds to wait for the loop to wind down after a shutdown signal
    pub shutdown_grace: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiConfig {
                base_url: parse_api_base()?,
                request_timeout: get_env_or("PINGER_REQUEST_TIMEOUT", "30")
                    .parse()
                    .map_err(|_| {
                        PingerError::Configuration(
                            "PINGER_REQUEST_TIMEOUT must be a number of seconds".into(),
                        )
                    })?,
            },
            accounts: AccountsConfig {
                file: PathBuf::from(get_env_or("PINGER_ACCOUNTS_FILE", "accounts.txt")),
                tokens: get_env_or("PINGER_TOKENS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            polling: PollingConfig {
                max_attempts: get_env_or("PINGER_MAX_ATTEMPTS", "3").parse().map_err(|_| {
                    PingerError::Configuration("PINGER_MAX_ATTEMPTS must be a valid number".into())
                })?,
                max_rounds: match env::var("PINGER_MAX_ROUNDS") {
                    Ok(v) if !v.trim().is_empty() => Some(v.trim().parse().map_err(|_| {
                        PingerError::Configuration(
                            "PINGER_MAX_ROUNDS must be a valid number".into(),
                        )
                    })?),
                    _ => None,
                },
                shutdown_grace: get_env_or("PINGER_SHUTDOWN_GRACE", "1")
                    .parse()
                    .map_err(|_| {
                        PingerError::Configuration(
                            "PINGER_SHUTDOWN_GRACE must be a number of seconds".into(),
                        )
                    })?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Settings for every account's polling client
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_secs(self.api.request_timeout.max(1)),
            ..ClientSettings::default()
        }
    }

    /// Settings for the round loop
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            max_attempts: self.polling.max_attempts.max(1),
            max_rounds: self.polling.max_rounds,
            ..SchedulerSettings::default()
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.polling.shutdown_grace)
    }

    /// Load the configured accounts, in order
    pub fn load_accounts(&self) -> Result<Vec<Account>> {
        if !self.accounts.tokens.is_empty() {
            return Ok(self
                .accounts
                .tokens
                .iter()
                .map(|token| Account::new(token.as_str(), None))
                .collect());
        }

        load_accounts_file(&self.accounts.file)
    }
}

/// Read an accounts file
pub fn load_accounts_file(path: &Path) -> Result<Vec<Account>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PingerError::Configuration(format!(
            "cannot read accounts file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_accounts(&content)
}

/// Parse accounts, one per line: `<token>` or `<token> <proxy-spec>`.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_accounts(content: &str) -> Result<Vec<Account>> {
    let mut accounts = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let token = fields.next().unwrap_or_default();
        let proxy = fields.next().map(str::to_string);

        if fields.next().is_some() {
            return Err(PingerError::Configuration(format!(
                "accounts line {}: expected '<token> [proxy]'",
                idx + 1
            )));
        }

        accounts.push(Account::new(token, proxy));
    }

    Ok(accounts)
}

fn parse_api_base() -> Result<String> {
    let raw = get_env_or("PINGER_API_BASE", DEFAULT_API_BASE);
    let raw = raw.trim().trim_end_matches('/');

    let url = Url::parse(raw).map_err(|e| {
        PingerError::Configuration(format!("PINGER_API_BASE must be a valid URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(PingerError::Configuration(format!(
            "PINGER_API_BASE has unsupported scheme: {}",
            other
        ))),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
