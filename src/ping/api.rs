//! Check-in API call
//!
//! [`PingApi`] is the single outbound operation the engine needs. The
//! production implementation is [`HttpPingApi`]; tests script responses.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::{PingerError, Result};
use crate::proxy::TransportHandle;

/// Path of the check-in endpoint, relative to the API base
pub const PING_PATH: &str = "/user/nodes/ping";

/// Default API base
pub const DEFAULT_API_BASE: &str = "https://nodego.ai/api";

/// User-Agent labels rotated per request
pub const USER_AGENTS: [&str; 7] = [
    "Chrome-Win10",
    "Chrome-Mac",
    "Firefox-Win",
    "Firefox-Mac",
    "Chrome-Linux",
    "Safari-iPhone",
    "Edge-Win",
];

/// Pick a User-Agent label from [`USER_AGENTS`]
pub fn random_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// Raw outcome of one check-in call that reached the server
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Raw `Retry-After` header, if any
    pub retry_after: Option<String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Authenticated check-in call
///
/// Returns `Ok` for any HTTP response, including error statuses; `Err` is
/// reserved for requests that never produced a response.
#[async_trait]
pub trait PingApi: Send + Sync {
    async fn ping(&self, user_agent: &str) -> Result<ApiResponse>;
}

/// [`PingApi`] over reqwest, one client per account
pub struct HttpPingApi {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpPingApi {
    /// Create a client for one account.
    ///
    /// The transport handle, when present, is owned by this client alone.
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        transport: Option<TransportHandle>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        builder = match transport {
            Some(transport) => transport.apply(builder),
            // Direct means direct: ignore HTTP(S)_PROXY from the environment
            None => builder.no_proxy(),
        };

        let client = builder
            .build()
            .map_err(|e| PingerError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), PING_PATH),
            token: token.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PingApi for HttpPingApi {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn ping(&self, user_agent: &str) -> Result<ApiResponse> {
        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "*/*")
            .header(USER_AGENT, user_agent)
            .json(&json!({ "type": "extension" }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!("Check-in responded with {}", status);

        Ok(ApiResponse {
            status,
            retry_after,
            body,
        })
    }
}
