//! Server identity as seen by the execution layer.

use std::fmt;

use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 27017;

/// The role a server plays in its deployment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize, derive_more::Display)]
#[non_exhaustive]
pub enum ServerType {
    Standalone,
    Mongos,
    RsPrimary,
    RsSecondary,
    RsArbiter,
    RsOther,
    LoadBalancer,
    #[default]
    Unknown,
}

/// The host and port of a server.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ServerAddress {
    pub host: String,
    pub port: Option<u16>,
}

impl ServerAddress {
    /// Creates an address with an explicit port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
        }
    }

    /// Parses `host[:port]`.
    pub fn parse(address: &str) -> Option<Self> {
        let mut parts = address.rsplitn(2, ':');
        let last = parts.next()?;
        match parts.next() {
            Some(host) if !host.is_empty() => Some(Self {
                host: host.to_string(),
                port: Some(last.parse().ok()?),
            }),
            Some(_) => None,
            None if last.is_empty() => None,
            None => Some(Self {
                host: last.to_string(),
                port: None,
            }),
        }
    }

    pub(crate) fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port_or_default())
    }
}
