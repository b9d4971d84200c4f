/// Protocol-level errors for ringcast.
///
/// Wraps transport errors and adds the relay-specific variants.
#[derive(Debug, thiserror::Error)]
pub enum RingProtocolError {
    #[error("transport error: {0}")]
    Transport(#[from] ringcast_transport::RingTransportError),

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("next hop unavailable, frame {frame_id} dropped: {reason}")]
    NextHopUnavailable { frame_id: String, reason: String },

    #[error("runtime shut down")]
    Shutdown,
}
