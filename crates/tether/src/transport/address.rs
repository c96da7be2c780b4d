// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint addresses in the form `[scheme://]host:port`.
//!
//! TCP is the default and only scheme. Bind-capable roles accept `*` as the
//! port (system assignment) and as the host (all interfaces); after binding,
//! the socket substitutes the concrete port back so `address()` reports a
//! usable endpoint.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// `*`: let the system pick a free port on bind.
    Any,
    Number(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    host: String,
    port: Port,
}

impl Address {
    /// Parse an address for a connect-capable role; the port is mandatory.
    pub fn parse(text: &str) -> Result<Self> {
        let address = Self::parse_raw(text)?;
        if address.port == Port::Any {
            return Err(Error::InvalidArgument(format!(
                "missing port in address {text:?}"
            )));
        }
        Ok(address)
    }

    /// Parse an address for a bind-capable role; a missing port means `*`.
    pub fn parse_bind(text: &str) -> Result<Self> {
        Self::parse_raw(text)
    }

    fn parse_raw(text: &str) -> Result<Self> {
        let rest = match text.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some((scheme, _)) => {
                return Err(Error::InvalidArgument(format!(
                    "unsupported scheme {scheme:?} in address {text:?}"
                )))
            }
            None => text,
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (rest, None),
        };

        if host.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "missing host in address {text:?}"
            )));
        }

        let port = match port {
            None | Some("*") => Port::Any,
            Some(number) => Port::Number(number.parse().map_err(|_| {
                Error::InvalidArgument(format!("invalid port {number:?} in address {text:?}"))
            })?),
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Port {
        self.port
    }

    /// The same host with a different port; how a replier-derived publisher
    /// address and a requester-derived subscriber address are built.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port: Port::Number(port),
        }
    }

    /// The same host with a system-assigned port.
    pub fn with_any_port(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: Port::Any,
        }
    }

    /// Resolve to a socket address; `*` maps to the wildcard host and port 0.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let port = match self.port {
            Port::Any => 0,
            Port::Number(number) => number,
        };
        if self.host == "*" {
            return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
        }
        (self.host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| Error::InvalidArgument(format!("cannot resolve {self}: {e}")))?
            .next()
            .ok_or_else(|| Error::InvalidArgument(format!("cannot resolve {self}")))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Port::Any => write!(f, "tcp://{}:*", self.host),
            Port::Number(number) => write!(f, "tcp://{}:{}", self.host, number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_default_scheme() {
        let address = Address::parse("127.0.0.1:4020").unwrap();
        assert_eq!(address.host(), "127.0.0.1");
        assert_eq!(address.port(), Port::Number(4020));
        assert_eq!(address.to_string(), "tcp://127.0.0.1:4020");
    }

    #[test]
    fn test_parse_with_explicit_scheme() {
        let address = Address::parse("tcp://localhost:80").unwrap();
        assert_eq!(address.host(), "localhost");
        assert_eq!(address.port(), Port::Number(80));
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let err = Address::parse("ipc://robot:1").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_parse_requires_port_for_connect() {
        for text in ["127.0.0.1", "tcp://127.0.0.1", "127.0.0.1:*"] {
            let err = Address::parse(text).unwrap_err();
            assert!(
                matches!(err, Error::InvalidArgument(_)),
                "expected missing-port failure for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_parse_bind_accepts_wildcards() {
        let address = Address::parse_bind("*").unwrap();
        assert_eq!(address.host(), "*");
        assert_eq!(address.port(), Port::Any);

        let address = Address::parse_bind("tcp://127.0.0.1:*").unwrap();
        assert_eq!(address.port(), Port::Any);

        let address = Address::parse_bind("127.0.0.1").unwrap();
        assert_eq!(address.port(), Port::Any);
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        let err = Address::parse("127.0.0.1:http").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_port_substitution() {
        let address = Address::parse("tcp://127.0.0.1:4020").unwrap();
        assert_eq!(
            address.with_port(5030).to_string(),
            "tcp://127.0.0.1:5030"
        );
        assert_eq!(address.with_any_port().to_string(), "tcp://127.0.0.1:*");
    }

    #[test]
    fn test_socket_addr_resolution() {
        let address = Address::parse("127.0.0.1:4020").unwrap();
        assert_eq!(address.socket_addr().unwrap().port(), 4020);

        let wildcard = Address::parse_bind("*").unwrap();
        let resolved = wildcard.socket_addr().unwrap();
        assert!(resolved.ip().is_unspecified());
        assert_eq!(resolved.port(), 0);
    }
}
