//! Host address type.
//!
//! Every docker host is addressed by its `ip:port` pair. The same host shows up
//! in several spellings (bare `10.0.0.1:4242`, `http://10.0.0.1:4242`) depending on
//! who produced the value, so everything is normalised through [`HostAddr`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// The `ip:port` address of a docker host (or of the cluster manager).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostAddr {
    ip: String,
    port: u16,
}

impl HostAddr {
    /// Create a host address from its parts.
    #[must_use]
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Parse a host address, accepting an optional `http://` or `https://` scheme.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidHost` if the address has no host part or no
    /// numeric port.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let bare = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (ip, port) = bare
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidHost(s.to_string()))?;

        if ip.is_empty() || ip.contains('/') {
            return Err(CoreError::InvalidHost(s.to_string()));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidHost(s.to_string()))?;

        Ok(Self {
            ip: ip.to_string(),
            port,
        })
    }

    /// The host part (usually an IPv4 address).
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// The docker daemon port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The bare `ip:port` form.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// The URL form, `http://ip:port`.
    #[must_use]
    pub fn to_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

/// Derive the org from a cluster node name.
///
/// Nodes are named `<hostname>.<org>`, e.g. `ip-10-4-132-87.123123123`.
#[must_use]
pub fn org_from_node_name(name: &str) -> Option<&str> {
    name.split('.').nth(1).filter(|org| !org.is_empty())
}

impl fmt::Debug for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostAddr({}:{})", self.ip, self.port)
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for HostAddr {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HostAddr {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<HostAddr> for String {
    fn from(host: HostAddr) -> Self {
        host.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_address() {
        let host = HostAddr::parse("10.4.132.87:4242").unwrap();
        assert_eq!(host.ip(), "10.4.132.87");
        assert_eq!(host.port(), 4242);
        assert_eq!(host.address(), "10.4.132.87:4242");
        assert_eq!(host.to_url(), "http://10.4.132.87:4242");
    }

    #[test]
    fn parse_url_form() {
        let host = HostAddr::parse("http://10.0.0.1:4242/").unwrap();
        assert_eq!(host.address(), "10.0.0.1:4242");

        let host = HostAddr::parse("https://swarm:2375").unwrap();
        assert_eq!(host.ip(), "swarm");
        assert_eq!(host.port(), 2375);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(HostAddr::parse("10.0.0.1").is_err());
        assert!(HostAddr::parse(":4242").is_err());
        assert!(HostAddr::parse("10.0.0.1:notaport").is_err());
        assert!(HostAddr::parse("").is_err());
    }

    #[test]
    fn display_and_parse_agree() {
        let host: HostAddr = "10.0.0.2:4242".parse().unwrap();
        assert_eq!(host.to_string(), "10.0.0.2:4242");
        assert_eq!(HostAddr::parse(&host.to_string()).unwrap(), host);
    }

    #[test]
    fn serde_as_string() {
        let host = HostAddr::parse("10.0.0.3:4242").unwrap();
        let json = serde_json::to_string(&host).unwrap();
        assert_eq!(json, "\"10.0.0.3:4242\"");

        let back: HostAddr = serde_json::from_str("\"http://10.0.0.3:4242\"").unwrap();
        assert_eq!(back, host);

        assert!(serde_json::from_str::<HostAddr>("\"nope\"").is_err());
    }

    #[test]
    fn org_from_node() {
        assert_eq!(org_from_node_name("ip-10-4-132-87.123123123"), Some("123123123"));
        assert_eq!(org_from_node_name("ip-10-4-132-87"), None);
        assert_eq!(org_from_node_name("ip-10-4-132-87."), None);
    }
}
