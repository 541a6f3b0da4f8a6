//! Proxy handling
//!
//! This module turns user supplied proxy specs into client transports:
//! - Normalization of the accepted proxy spec shapes
//! - HTTP/HTTPS and SOCKS4/4a/5/5h transport construction

pub mod normalize;
pub mod transport;

pub use normalize::normalize;
pub use transport::{ProxyTransport, TransportHandle};
