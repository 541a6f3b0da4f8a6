//! Check-in polling
//!
//! - [`api`]: the outbound call and its reqwest implementation
//! - [`client`]: per-account cooldown and rate-limit handling

pub mod api;
pub mod client;

pub use api::{ApiResponse, HttpPingApi, PingApi, DEFAULT_API_BASE, PING_PATH, USER_AGENTS};
pub use client::{parse_retry_after, ClientSettings, PingClient, PollState};
