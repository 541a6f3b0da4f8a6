//! Proxy transport construction for HTTP and SOCKS protocols
//!
//! Turns a normalized [`ProxyEndpoint`] into the proxy handle(s) the HTTP
//! client routes its requests through.

use tracing::{debug, instrument, warn};

use super::normalize::normalize;
use crate::error::{PingerError, Result};
use crate::models::{EventKind, EventSink, ProxyEndpoint};

/// Proxy routing for one account's client
#[derive(Debug, Clone)]
pub enum TransportHandle {
    /// One SOCKS handle carries both plain and TLS traffic
    Socks(reqwest::Proxy),
    /// Separate handles for plain-HTTP and HTTPS outbound calls, both
    /// pointing at the same proxy
    Http {
        http: reqwest::Proxy,
        https: reqwest::Proxy,
    },
}

impl TransportHandle {
    pub fn is_socks(&self) -> bool {
        matches!(self, TransportHandle::Socks(_))
    }

    /// Install this handle on a client builder
    pub fn apply(self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        match self {
            TransportHandle::Socks(all) => builder.proxy(all),
            TransportHandle::Http { http, https } => builder.proxy(http).proxy(https),
        }
    }
}

/// Proxy transport factory
pub struct ProxyTransport;

impl ProxyTransport {
    /// Build the transport handle for a normalized endpoint
    #[instrument(skip(endpoint), fields(proxy = %endpoint))]
    pub fn build(endpoint: &ProxyEndpoint) -> Result<TransportHandle> {
        let protocol = endpoint
            .protocol()
            .ok_or_else(|| PingerError::UnsupportedProxyProtocol(endpoint.scheme.clone()))?;

        if protocol.is_socks() {
            debug!("Building {} transport", protocol);
            let url = endpoint.url_with_scheme(protocol.client_scheme());
            let proxy = reqwest::Proxy::all(&url).map_err(|e| transport_error(endpoint, e))?;
            return Ok(TransportHandle::Socks(proxy));
        }

        debug!("Building HTTP proxy transport pair");
        let url = format!("{}://{}", protocol.as_str(), endpoint.address());
        let http = reqwest::Proxy::http(&url).map_err(|e| transport_error(endpoint, e))?;
        let https = reqwest::Proxy::https(&url).map_err(|e| transport_error(endpoint, e))?;

        let (http, https) = match (&endpoint.username, &endpoint.password) {
            (Some(username), password) => {
                let password = password.as_deref().unwrap_or("");
                (
                    http.basic_auth(username, password),
                    https.basic_auth(username, password),
                )
            }
            _ => (http, https),
        };

        Ok(TransportHandle::Http { http, https })
    }

    /// Parse and build in one step
    pub fn from_spec(spec: &str) -> Result<TransportHandle> {
        let endpoint = normalize(spec)?;
        Self::build(&endpoint)
    }

    /// Transport for one account.
    ///
    /// No spec means direct requests. A spec that fails to parse or build
    /// is reported through `events` and also falls back to direct requests.
    pub fn for_account(
        spec: Option<&str>,
        account: &str,
        events: &EventSink,
    ) -> Option<TransportHandle> {
        let spec = spec?;

        match Self::from_spec(spec) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(account = %account, "Proxy disabled: {}", e);
                events.emit(
                    Some(account),
                    EventKind::ProxyDisabled {
                        reason: e.to_string(),
                    },
                );
                None
            }
        }
    }
}

fn transport_error(endpoint: &ProxyEndpoint, err: reqwest::Error) -> PingerError {
    PingerError::Transport(format!("{}: {}", endpoint.redacted(), err))
}
