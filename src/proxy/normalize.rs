//! Proxy spec normalization
//!
//! Users paste proxies in whatever shape their provider lists them. Every
//! accepted shape is reduced to one [`ProxyEndpoint`] here so the transport
//! factory only ever sees a canonical form.
//!
//! Accepted shapes, in order of precedence:
//!
//! 1. `scheme://[user:pass@]host[:port]`
//! 2. `host:port:user:pass`
//! 3. `user:pass@host:port`
//! 4. `host:port`
//!
//! Shapes 2-4 default to `http`. They have no escaping, so credentials
//! containing `@` or `:` are rejected instead of being split in the wrong
//! place; use shape 1 with percent-encoding for those.

use url::{Host, Url};

use crate::error::{PingerError, Result};
use crate::models::{ProxyEndpoint, ProxyProtocol};

const DEFAULT_SCHEME: &str = "http";

/// Parse a raw proxy spec into a [`ProxyEndpoint`]
pub fn normalize(raw: &str) -> Result<ProxyEndpoint> {
    let spec = raw.trim();
    if spec.is_empty() {
        return Err(malformed(raw, "empty proxy spec"));
    }

    if spec.contains("://") {
        return parse_url(raw, spec);
    }

    let parts: Vec<&str> = spec.split(':').collect();

    if parts.len() == 4 {
        let (host, port, username, password) = (parts[0], parts[1], parts[2], parts[3]);
        if host.contains('@') || username.contains('@') || password.contains('@') {
            return Err(malformed(raw, "'@' is not allowed in host:port:user:pass"));
        }
        return endpoint(raw, host, port, Some((username, password)));
    }

    if let Some((auth, address)) = spec.split_once('@') {
        let (username, password) = auth
            .split_once(':')
            .ok_or_else(|| malformed(raw, "expected user:pass before '@'"))?;
        if password.contains(':') || address.contains('@') {
            return Err(malformed(raw, "credentials must not contain ':' or '@'"));
        }
        let (host, port) = address
            .split_once(':')
            .ok_or_else(|| malformed(raw, "expected host:port after '@'"))?;
        return endpoint(raw, host, port, Some((username, password)));
    }

    if parts.len() == 2 {
        return endpoint(raw, parts[0], parts[1], None);
    }

    Err(malformed(raw, "unrecognized proxy format"))
}

/// Shape 1: the spec already carries a scheme
fn parse_url(raw: &str, spec: &str) -> Result<ProxyEndpoint> {
    let url = Url::parse(spec).map_err(|e| malformed(raw, &e.to_string()))?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| malformed(raw, "missing host"))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    let scheme = url.scheme().to_lowercase();
    let port = url
        .port_or_known_default()
        .or_else(|| ProxyProtocol::default_port(&scheme))
        .ok_or_else(|| malformed(raw, "missing port"))?;

    let username = Some(url.username())
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    let password = url.password().map(str::to_string);

    Ok(ProxyEndpoint {
        scheme,
        host: host.to_string(),
        port,
        username,
        password,
    })
}

/// Shapes 2-4: validate the pieces and assemble an `http` endpoint
fn endpoint(
    raw: &str,
    host: &str,
    port: &str,
    credentials: Option<(&str, &str)>,
) -> Result<ProxyEndpoint> {
    let host = host.trim();
    if host.is_empty() {
        return Err(malformed(raw, "missing host"));
    }
    Host::parse(host).map_err(|e| malformed(raw, &format!("invalid host: {}", e)))?;

    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| malformed(raw, "port must be a number between 0 and 65535"))?;

    let (username, password) = match credentials {
        Some((user, _)) if user.is_empty() => {
            return Err(malformed(raw, "missing username"));
        }
        Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
        None => (None, None),
    };

    Ok(ProxyEndpoint {
        scheme: DEFAULT_SCHEME.to_string(),
        host: host.to_string(),
        port,
        username,
        password,
    })
}

fn malformed(raw: &str, reason: &str) -> PingerError {
    PingerError::MalformedProxySpec(format!("'{}': {}", raw.trim(), reason))
}
