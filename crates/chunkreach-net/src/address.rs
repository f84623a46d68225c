//! Auxiliary server addresses as written in the configuration.
//!
//! Accepted forms are `host`, `host:port`, `[v6]` and `[v6]:port`. A bare
//! IPv6 literal without brackets is taken as a host with no port.

use std::fmt;
use std::str::FromStr;

/// Port used when an address carries none.
pub const DEFAULT_PORT: u16 = 44444;

/// Errors produced while parsing a server address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Nothing before the port separator.
    #[error("server address has no host: {0:?}")]
    EmptyHost(String),
    /// The port is not a number in `1..=65535`.
    #[error("invalid port in server address {0:?}")]
    InvalidPort(String),
}

/// A host name or IP literal plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host` or `host:port`, defaulting the port to [`DEFAULT_PORT`].
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            match rest.split_once(']') {
                Some((host, "")) => (host, None),
                Some((host, tail)) => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(AddressError::InvalidPort(input.to_string())),
                },
                None => return Err(AddressError::EmptyHost(input.to_string())),
            }
        } else if input.matches(':').count() > 1 {
            (input, None)
        } else {
            match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() {
            return Err(AddressError::EmptyHost(input.to_string()));
        }

        let port = match port {
            None => DEFAULT_PORT,
            Some(port) => match port.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(AddressError::InvalidPort(input.to_string())),
            },
        };

        Ok(Self::new(host, port))
    }
}

impl FromStr for ServerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
