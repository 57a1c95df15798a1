//! Port-mapping record types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Https,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Udp, Protocol::Http, Protocol::Https];

    /// The bucket name used under `portmap`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Whether mappings carry a domain level between the two sockets.
    pub fn has_domain(&self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown protocol: {0}")]
pub struct ParseProtocolError(String);

impl FromStr for Protocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseProtocolError(s.to_string()))
    }
}

/// One forwarding rule from an external socket to an internal one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub protocol: Protocol,
    pub external_socket: String,
    pub internal_socket: String,
    /// Set for `http`/`https` mappings only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl PortMapping {
    /// A `tcp`/`udp` style mapping without a domain.
    pub fn new(
        protocol: Protocol,
        external_socket: impl Into<String>,
        internal_socket: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            external_socket: external_socket.into(),
            internal_socket: internal_socket.into(),
            domain: None,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocols_parse_case_insensitively() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("HTTPS".parse::<Protocol>().unwrap(), Protocol::Https);
        assert!("sctp".parse::<Protocol>().is_err());
        assert!("".parse::<Protocol>().is_err());
    }

    #[test]
    fn only_http_protocols_have_domains() {
        assert!(!Protocol::Tcp.has_domain());
        assert!(!Protocol::Udp.has_domain());
        assert!(Protocol::Http.has_domain());
        assert!(Protocol::Https.has_domain());
    }

    #[test]
    fn display_matches_bucket_name() {
        for p in Protocol::ALL {
            assert_eq!(p.to_string(), p.as_str());
        }
    }

    #[test]
    fn mapping_serializes_without_empty_domain() {
        let m = PortMapping::new(Protocol::Udp, "0.0.0.0:53", "10.10.0.5:53");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "protocol": "udp",
                "external_socket": "0.0.0.0:53",
                "internal_socket": "10.10.0.5:53",
            })
        );

        let m = m.with_domain("example.com");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["domain"], "example.com");
    }
}
