use crate::PeerAddress;

/// Errors returned by the ringcast transport layer.
#[derive(Debug, thiserror::Error)]
pub enum RingTransportError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: PeerAddress,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to next hop {addr} failed: {source}")]
    Connect {
        addr: PeerAddress,
        #[source]
        source: std::io::Error,
    },

    #[error("write to next hop {addr} failed: {source}")]
    Send {
        addr: PeerAddress,
        #[source]
        source: std::io::Error,
    },

    #[error("no connection to next hop {addr}")]
    NotConnected { addr: PeerAddress },

    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),

    #[error("frame serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("frame deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid address (expected host:port): {0}")]
    InvalidAddress(String),

    #[error("node is shut down")]
    Shutdown,
}

impl RingTransportError {
    pub(crate) fn invalid_frame(reason: &str) -> Self {
        RingTransportError::InvalidFrame {
            reason: reason.to_string(),
        }
    }
}
