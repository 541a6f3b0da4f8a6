use serde::{Deserialize, Serialize};

/// Proxy protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks4,
    Socks4a,
    Socks5,
    Socks5h,
    /// Bare `socks://`, treated as SOCKS5
    Socks,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks4a => "socks4a",
            ProxyProtocol::Socks5 => "socks5",
            ProxyProtocol::Socks5h => "socks5h",
            ProxyProtocol::Socks => "socks",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks4" => Some(ProxyProtocol::Socks4),
            "socks4a" => Some(ProxyProtocol::Socks4a),
            "socks5" => Some(ProxyProtocol::Socks5),
            "socks5h" => Some(ProxyProtocol::Socks5h),
            "socks" => Some(ProxyProtocol::Socks),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(
            self,
            ProxyProtocol::Socks4
                | ProxyProtocol::Socks4a
                | ProxyProtocol::Socks5
                | ProxyProtocol::Socks5h
                | ProxyProtocol::Socks
        )
    }

    /// Scheme understood by the HTTP client's proxy parser
    pub fn client_scheme(&self) -> &'static str {
        match self {
            ProxyProtocol::Socks => "socks5",
            other => other.as_str(),
        }
    }

    /// Port assumed when a proxy URL leaves it out
    pub fn default_port(scheme: &str) -> Option<u16> {
        match Self::from_str(scheme)? {
            ProxyProtocol::Http => Some(80),
            ProxyProtocol::Https => Some(443),
            _ => Some(1080),
        }
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical proxy endpoint produced from a user supplied proxy spec.
///
/// `scheme` is kept as text: an unknown scheme is still a well-formed
/// endpoint and only fails when a transport is built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyEndpoint {
    /// Get the protocol enum
    pub fn protocol(&self) -> Option<ProxyProtocol> {
        ProxyProtocol::from_str(&self.scheme)
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Proxy URL under `scheme`, with credentials when present
    pub fn url_with_scheme(&self, scheme: &str) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}", scheme, user, pass, self.address())
            }
            (Some(user), None) => {
                format!("{}://{}@{}", scheme, user, self.address())
            }
            _ => {
                format!("{}://{}", scheme, self.address())
            }
        }
    }

    /// URL safe to write to logs
    pub fn redacted(&self) -> String {
        if self.has_credentials() {
            format!("{}://***@{}", self.scheme, self.address())
        } else {
            format!("{}://{}", self.scheme, self.address())
        }
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.redacted())
    }
}
