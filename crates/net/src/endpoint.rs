//! Server endpoint addressing
//!
//! Endpoint format: ws://<host>:<port>/socket

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Fixed request path of the server socket
pub const DEFAULT_PATH: &str = "/socket";

/// Address of the single server the session talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    /// Create an endpoint on the default socket path
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            path: DEFAULT_PATH.to_string(),
        }
    }

    /// Replace the request path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Format as a WebSocket URL
    pub fn to_url(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("ws://{}:{}{}", host, self.port, self.path)
    }

    /// Parse from URL string
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("ws://")
            .ok_or_else(|| Error::InvalidEndpoint(format!("missing ws:// prefix in '{}'", s)))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, DEFAULT_PATH),
        };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| Error::InvalidEndpoint(format!("unclosed '[' in '{}'", s)))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| Error::InvalidEndpoint(format!("missing port in '{}'", s)))?;
            (host, port)
        } else {
            authority
                .rsplit_once(':')
                .ok_or_else(|| Error::InvalidEndpoint(format!("missing port in '{}'", s)))?
        };

        if host.is_empty() {
            return Err(Error::InvalidEndpoint(format!("empty host in '{}'", s)));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidEndpoint(format!("bad port '{}'", port)))?;

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_url())
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let endpoint = Endpoint::new("127.0.0.1", 8000);
        assert_eq!(endpoint.to_url(), "ws://127.0.0.1:8000/socket");
    }

    #[test]
    fn test_ipv6_host_is_bracketed() {
        let endpoint = Endpoint::new("::1", 8000);
        assert_eq!(endpoint.to_url(), "ws://[::1]:8000/socket");

        let parsed = Endpoint::parse(&endpoint.to_url()).unwrap();
        assert_eq!(parsed.host, "::1");
        assert_eq!(parsed.port, 8000);
    }

    #[test]
    fn test_parse_hostname_and_path() {
        let endpoint: Endpoint = "ws://game.example.net:8181/custom".parse().unwrap();
        assert_eq!(endpoint.host, "game.example.net");
        assert_eq!(endpoint.port, 8181);
        assert_eq!(endpoint.path, "/custom");
    }

    #[test]
    fn test_parse_without_path_uses_default() {
        let endpoint = Endpoint::parse("ws://localhost:8000").unwrap();
        assert_eq!(endpoint, Endpoint::new("localhost", 8000));
    }

    #[test]
    fn test_parse_invalid() {
        // Wrong scheme
        assert!(Endpoint::parse("http://localhost:8000/socket").is_err());

        // Missing port
        assert!(Endpoint::parse("ws://localhost/socket").is_err());

        // Bad port
        assert!(Endpoint::parse("ws://localhost:99999/socket").is_err());

        // Empty host
        assert!(Endpoint::parse("ws://:8000/socket").is_err());

        // Unclosed IPv6 bracket
        assert!(Endpoint::parse("ws://[::1:8000/socket").is_err());
    }
}
