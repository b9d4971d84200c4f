use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RingNodeConfig;
use crate::connection::NextHopLink;
use crate::listener::{FrameHandler, InboundListener};
use crate::{PeerAddress, RingTransportError};

/// A ring transport node: one inbound listener, one next-hop link.
///
/// This is the main entry point for consumers. Binding is fatal on
/// failure; dialing the next hop happens in the background once
/// [`start`](Self::start) is called.
pub struct RingNode {
    listener: Option<InboundListener>,
    link: NextHopLink,
    local_addr: SocketAddr,
    advertised: PeerAddress,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RingNode {
    /// Bind the listener and prepare the next-hop link.
    pub async fn bind(config: RingNodeConfig) -> Result<Self, RingTransportError> {
        let listener = InboundListener::bind(&config.listen, config.max_frame_size).await?;
        let cancel = CancellationToken::new();
        let link = NextHopLink::from_config(&config, cancel.clone());
        let advertised = config.advertised.clone();
        Ok(Self::from_parts(listener, link, advertised, cancel))
    }

    /// Assemble a node from an already-bound listener.
    ///
    /// `link` should have been created with `cancel` (or a child of it) so
    /// that [`shutdown`](Self::shutdown) also stops the dialer.
    pub fn from_parts(
        listener: InboundListener,
        link: NextHopLink,
        advertised: Option<PeerAddress>,
        cancel: CancellationToken,
    ) -> Self {
        let local_addr = listener.local_addr();
        let advertised = advertised.unwrap_or_else(|| local_addr.into());
        Self {
            listener: Some(listener),
            link,
            local_addr,
            advertised,
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Address placed in outgoing frames so recipients can notify us.
    pub fn advertised_addr(&self) -> &PeerAddress {
        &self.advertised
    }

    /// The actual bound listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn link(&self) -> &NextHopLink {
        &self.link
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start accepting inbound frames and dialing the next hop.
    ///
    /// Only the first call has an effect.
    pub fn start<H: FrameHandler>(&mut self, handler: Arc<H>) {
        let Some(listener) = self.listener.take() else {
            tracing::warn!("ring node on {} already started", self.local_addr);
            return;
        };
        self.tasks.push(listener.spawn(handler, self.cancel.clone()));
        self.tasks.push(self.link.spawn_maintainer());
    }

    /// Stop the listener, every connection reader and the next-hop link.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::debug!("ring node on {} shut down", self.local_addr);
    }
}

impl std::fmt::Debug for RingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingNode")
            .field("local_addr", &self.local_addr)
            .field("advertised", &self.advertised)
            .field("next_hop", self.link.addr())
            .finish()
    }
}
