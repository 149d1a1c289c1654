use std::fmt::{self, Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Control endpoint of a monitored application.
///
/// HA peers reference each other by control URL; two endpoints are the same
/// when host and port match. The scheme only decides the default port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessPoint {
    pub address: String,
    pub port: u16,
    pub secure: bool,
}

impl AccessPoint {
    pub fn new(address: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            address: address.into().to_ascii_lowercase(),
            port,
            secure,
        }
    }

    /// URL of the endpoint with a trailing slash, e.g. `http://192.0.2.1:8000/`.
    pub fn url(&self) -> String {
        host_with_port_url(&self.address, self.port, self.secure)
    }

    /// True when `url` points at this endpoint.
    pub fn matches_url(&self, url: &str) -> bool {
        parse_url(url)
            .map(|other| self.same_endpoint(&other))
            .unwrap_or(false)
    }

    pub fn same_endpoint(&self, other: &AccessPoint) -> bool {
        self.address == other.address && self.port == other.port
    }
}

impl Display for AccessPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Format a control URL for a host and port.
pub fn host_with_port_url(address: &str, port: u16, secure: bool) -> String {
    let scheme = if secure { "https" } else { "http" };
    if address.contains(':') {
        format!("{scheme}://[{address}]:{port}/")
    } else {
        format!("{scheme}://{address}:{port}/")
    }
}

/// Parse an `http`/`https` URL into an access point.
///
/// IPv6 hosts must be bracketed. A missing port falls back to 80 or 443
/// depending on the scheme. Returns `None` when no host can be found.
pub fn parse_url(url: &str) -> Option<AccessPoint> {
    let url = url.trim();
    let secure = url.starts_with("https://");
    if !secure && !url.starts_with("http://") {
        return None;
    }

    let caps = bracketed_pattern()
        .captures(url)
        .or_else(|| plain_pattern().captures(url))?;
    let host = caps.get(1)?.as_str();
    let port = match caps.get(3) {
        Some(port) => port.as_str().parse::<u16>().ok()?,
        None if secure => 443,
        None => 80,
    };
    Some(AccessPoint::new(host, port, secure))
}

fn bracketed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://\[([^\s\]]+)\](:([0-9]+))?").expect("bracketed URL pattern is valid")
    })
}

fn plain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://([^\s:/\[\]]+)(:([0-9]+))?").expect("plain URL pattern is valid")
    })
}
