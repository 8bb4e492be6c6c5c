//! Daemon listening address.

use std::fmt;

use url::{Host, Url};

use crate::error::DaemonError;

/// Port used when the daemon URL does not name one.
pub const DEFAULT_PORT: u16 = 33001;

/// Host and port the daemon listens on.
///
/// Port `0` asks the daemon to pick a free port; the supervisor replaces it
/// with the discovered port once the daemon is up.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DaemonAddress {
    host: String,
    port: u16,
}

impl DaemonAddress {
    /// Creates an address from its parts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses a daemon URL such as `grpc://127.0.0.1:55002`.
    ///
    /// The scheme is ignored. A missing port falls back to [`DEFAULT_PORT`];
    /// an explicit port is kept even when it is the scheme's default. IPv6
    /// hosts are stored without brackets.
    pub fn parse(url: &str) -> Result<Self, DaemonError> {
        let invalid = |reason: String| DaemonError::InvalidAddress {
            url: url.to_owned(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(invalid("no host".to_owned())),
        };
        // `Url` drops a port equal to the scheme default, so look at the text.
        let port = match parsed.port() {
            Some(port) => port,
            None if names_port(url) => parsed.port_or_known_default().unwrap_or(DEFAULT_PORT),
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }

    /// Returns the host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port; `0` until an ephemeral port has been discovered.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Reports whether the daemon should choose its own port.
    pub const fn wants_ephemeral_port(&self) -> bool {
        self.port == 0
    }

    /// Returns a copy bound to `port`.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    /// Returns the plaintext HTTP/2 URI used to open the RPC channel.
    pub fn endpoint_uri(&self) -> String {
        format!("http://{self}")
    }
}

fn names_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, tail)| tail);
    let after_host = host_port.rsplit_once(']').map_or(host_port, |(_, tail)| tail);
    after_host.contains(':')
}

impl fmt::Display for DaemonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
