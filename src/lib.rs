//! NodeGo pinger - multi-account check-in poller
//!
//! Keeps a set of accounts checked in with the NodeGo API.
//!
//! ## Features
//!
//! - Proxy specs accepted as `ip:port:user:pass`, `user:pass@ip:port`,
//!   `ip:port` or full URLs
//! - HTTP, HTTPS, SOCKS4, SOCKS4a, SOCKS5 and SOCKS5h proxies, one per account
//! - Per-account request spacing and `Retry-After` aware 429 handling
//! - Bounded, jittered retries and randomized round spacing
//! - Graceful shutdown on Ctrl+C / SIGTERM

pub mod config;
pub mod error;
pub mod models;
pub mod ping;
pub mod proxy;
pub mod services;

pub use config::Config;
pub use error::{PingerError, Result};
