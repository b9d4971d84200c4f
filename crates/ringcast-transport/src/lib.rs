//! ringcast transport layer.
//!
//! Every peer listens for inbound TCP connections and keeps exactly one
//! outbound connection, to the next peer of the ring. Frames travel as
//! newline-terminated JSON objects.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ringcast_transport::{DeliveryFrame, Frame, RingNode, RingNodeConfig};
//!
//! # async fn example() -> Result<(), ringcast_transport::RingTransportError> {
//! let config = RingNodeConfig::new("127.0.0.1:9651".parse()?, "127.0.0.1:9652".parse()?);
//! let node = RingNode::bind(config).await?;
//! node.link().ensure_connected().await?;
//!
//! let frame = DeliveryFrame::new(
//!     "msg-1",
//!     "alice".into(),
//!     Some(node.advertised_addr().clone()),
//!     vec!["bob".into()],
//!     "hello",
//!     10,
//! );
//! node.link().forward(&Frame::Delivery(frame)).await?;
//! # Ok(())
//! # }
//! ```

mod codec;
mod config;
mod connection;
mod error;
mod frame;
mod listener;
mod node;

pub use codec::{decode_line, encode_line};
pub use config::RingNodeConfig;
pub use connection::NextHopLink;
pub use error::RingTransportError;
pub use frame::{
    now_secs, DeliveryFrame, Frame, FrameKind, NotificationFrame, NOTIFICATION_ID_SUFFIX,
};
pub use listener::{FrameHandler, InboundListener};
pub use node::RingNode;

use std::fmt;
use std::str::FromStr;

/// Display name of a ring peer. Unique within the ring.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerName(String);

impl PeerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerName({})", self.0)
    }
}

impl From<&str> for PeerName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl serde::Serialize for PeerName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PeerName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// `host:port` of a peer's inbound listener.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build from the separate host/port strings carried on the wire.
    ///
    /// Returns `None` when the host is empty or the port is not a `u16`.
    pub fn from_parts(host: &str, port: &str) -> Option<Self> {
        if host.is_empty() {
            return None;
        }
        let port = port.trim().parse().ok()?;
        Some(Self::new(host, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PeerAddress {
    type Err = RingTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RingTransportError::InvalidAddress(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Self::from_parts(host, port).ok_or_else(|| RingTransportError::InvalidAddress(s.to_string()))
    }
}

impl From<std::net::SocketAddr> for PeerAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_peer_address() {
        let addr: PeerAddress = "185.104.251.226:9651".parse().unwrap();
        assert_eq!(addr.host(), "185.104.251.226");
        assert_eq!(addr.port(), 9651);
        assert_eq!(addr.to_string(), "185.104.251.226:9651");
    }

    #[test]
    fn parse_hostname_and_ipv6() {
        let addr: PeerAddress = "localhost:80".parse().unwrap();
        assert_eq!(addr.host(), "localhost");

        let v6: PeerAddress = "[::1]:9000".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.port(), 9000);
        assert_eq!(v6.to_string(), "[::1]:9000");
    }

    #[test]
    fn reject_malformed_addresses() {
        for bad in ["", "nocolon", ":9651", "host:", "host:port", "host:70000"] {
            assert!(
                bad.parse::<PeerAddress>().is_err(),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn from_parts_requires_both_halves() {
        assert_eq!(
            PeerAddress::from_parts("10.0.0.1", "9651"),
            Some(PeerAddress::new("10.0.0.1", 9651))
        );
        assert_eq!(PeerAddress::from_parts("", "9651"), None);
        assert_eq!(PeerAddress::from_parts("10.0.0.1", ""), None);
    }

    #[test]
    fn peer_name_serializes_as_string() {
        let name = PeerName::from("Peer1");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Peer1\"");
        let back: PeerName = serde_json::from_str("\"Peer1\"").unwrap();
        assert_eq!(back, name);
    }
}
