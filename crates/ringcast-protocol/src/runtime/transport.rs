use std::sync::Arc;

use ringcast_transport::{Frame, NextHopLink, RingTransportError};

/// Network seam for the relay core.
///
/// Production: implemented by `NextHopLink` (TCP to the next ring peer).
/// Tests: implemented by `MockTransport` (records what was forwarded).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hand one frame to the next hop. An error means the frame is lost.
    async fn forward(&self, frame: &Frame) -> Result<(), RingTransportError>;

    /// Whether a next-hop connection is currently up.
    fn is_connected(&self) -> bool {
        true
    }
}

// ── Impl for NextHopLink (production) ───────────────────────────────

#[async_trait::async_trait]
impl Transport for NextHopLink {
    async fn forward(&self, frame: &Frame) -> Result<(), RingTransportError> {
        NextHopLink::forward(self, frame).await
    }

    fn is_connected(&self) -> bool {
        NextHopLink::is_connected(self)
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for Arc<T> {
    async fn forward(&self, frame: &Frame) -> Result<(), RingTransportError> {
        (**self).forward(frame).await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

// ── MockTransport (tests) ───────────────────────────────────────────
