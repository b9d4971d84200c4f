/// Protocol runtime: wires the relay core to a live `RingNode`.
///
/// The runtime owns the node (listener + next-hop link) and all relay state
/// (router, peer directory, ledger, tracker). It exposes a handle plus
/// channels so the application (console, bot) never touches frames or sockets.
mod relay;
pub mod sink;
pub mod transport;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ringcast_metrics::MetricsSnapshot;
use ringcast_transport::{NextHopLink, PeerAddress, PeerName, RingNode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::directory::PeerRecord;
use crate::error::RingProtocolError;
use crate::ledger::LedgerEntry;
use crate::router::DropReason;
use crate::tracker::{StatusChange, TrackedStatus};
use crate::types::DEFAULT_MAX_HOPS;

pub use relay::RelayCore;
pub use sink::{ChannelSink, DeliverySink};
pub use transport::Transport;

// ── Configuration ─────────────────────────────────────────────────────

/// Configuration for the protocol runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// This peer's display name in the ring.
    pub local_name: PeerName,
    /// Address put in outgoing frames. Defaults to the node's advertised address.
    pub advertised: Option<PeerAddress>,
    /// Hop ceiling for originated deliveries and notifications.
    pub default_max_hops: u32,
    /// Deduplicate delivery frames by ID as well as notifications.
    pub dedup_deliveries: bool,
    /// Capacity of each application channel.
    pub channel_capacity: usize,
    /// Interval for message tracker eviction.
    pub tracker_cleanup_interval: Duration,
}

impl RuntimeConfig {
    pub fn new(local_name: impl Into<PeerName>) -> Self {
        Self {
            local_name: local_name.into(),
            advertised: None,
            default_max_hops: DEFAULT_MAX_HOPS,
            dedup_deliveries: true,
            channel_capacity: 256,
            tracker_cleanup_interval: Duration::from_secs(300),
        }
    }
}

// ── Events (runtime → app) ───────────────────────────────────────────

/// Content consumed by this peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub id: String,
    pub from: PeerName,
    pub content: String,
    /// Unix seconds, set by the originator.
    pub timestamp: i64,
    /// Hops the frame had made when it reached us.
    pub hop_count: u32,
}

/// "`recipient` received a message from `original_sender`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationReceived {
    /// Notification frame ID.
    pub id: String,
    /// ID of the acknowledged message, when recoverable.
    pub parent_id: Option<String>,
    pub recipient: PeerName,
    pub recipient_address: Option<PeerAddress>,
    pub original_sender: PeerName,
    pub content: String,
    pub timestamp: i64,
    /// We are the original sender; this is a receipt for our message.
    pub addressed_to_us: bool,
}

/// Protocol-level events the application may want to observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// The next-hop connection came up.
    NextHopConnected { addr: PeerAddress },
    /// The next-hop connection was lost.
    NextHopDisconnected { addr: PeerAddress },
    /// A malformed frame was discarded.
    FrameRejected { id: String, reason: String },
    /// A frame reached a terminal state without being forwarded.
    FrameDropped { id: String, reason: DropReason },
    /// A frame could not be handed to the next hop and was lost.
    ForwardFailed { id: String, error: String },
}

// ── RuntimeHandle (app-facing API) ───────────────────────────────────

/// Handle to a running RingRuntime.
///
/// Cheap to clone. Queries lock one structure briefly; `send` may wait up
/// to the link's forward window when the next hop is down.
#[derive(Clone)]
pub struct RuntimeHandle {
    core: Arc<RelayCore<NextHopLink>>,
    cancel: CancellationToken,
    stopped: CancellationToken,
}

impl RuntimeHandle {
    pub fn local_name(&self) -> &PeerName {
        self.core.local_name()
    }

    /// Address other peers see in our frames.
    pub fn local_address(&self) -> &PeerAddress {
        self.core.local_address()
    }

    /// Send `content` to `recipients` around the ring. Returns the message ID.
    pub async fn send<I, S>(&self, recipients: I, content: &str) -> Result<String, RingProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.cancel.is_cancelled() {
            return Err(RingProtocolError::Shutdown);
        }
        self.core.originate(recipients, content).await
    }

    /// Messages delivered to this peer, oldest first.
    pub fn delivered(&self) -> Vec<LedgerEntry> {
        self.core.delivered()
    }

    /// Who received what, as far as this peer has seen.
    pub fn received_by_peer(&self) -> BTreeMap<PeerName, Vec<LedgerEntry>> {
        self.core.received_by_peer()
    }

    /// Peers learned from notification traffic.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.core.peers()
    }

    /// Status of a message we sent.
    pub fn status(&self, message_id: &str) -> Option<TrackedStatus> {
        self.core.status(message_id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.core.metrics()
    }

    pub fn next_hop_connected(&self) -> bool {
        self.core.next_hop_connected()
    }

    /// Stop the listener, every reader and the next-hop link.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait until shutdown has completed.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("core", &self.core)
            .finish()
    }
}

// ── RuntimeChannels ──────────────────────────────────────────────────

/// Channels returned to the application when the runtime starts.
pub struct RuntimeChannels {
    /// Handle to query and drive the runtime.
    pub handle: RuntimeHandle,
    /// Messages addressed to this peer.
    pub messages: mpsc::Receiver<DeliveredMessage>,
    /// Notifications seen by this peer (ours and others').
    pub notifications: mpsc::Receiver<NotificationReceived>,
    /// Status changes for messages we sent.
    pub status_changes: mpsc::Receiver<StatusChange>,
    /// Protocol-level events.
    pub events: mpsc::Receiver<ProtocolEvent>,
}

// ── RingRuntime ──────────────────────────────────────────────────────

/// The protocol runtime: spawn it and communicate via the handle and channels.
pub struct RingRuntime;

impl RingRuntime {
    /// Start the relay on `node`.
    ///
    /// Takes ownership of the node, starts its listener and next-hop
    /// maintainer, and spawns the housekeeping tasks. Must be called from
    /// within a tokio runtime.
    pub fn spawn(mut node: RingNode, config: RuntimeConfig) -> RuntimeChannels {
        let capacity = config.channel_capacity.max(1);
        let (msg_tx, msg_rx) = mpsc::channel(capacity);
        let (notif_tx, notif_rx) = mpsc::channel(capacity);
        let (status_tx, status_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let sink: Arc<dyn DeliverySink> =
            Arc::new(ChannelSink::new(msg_tx, notif_tx, status_tx, event_tx));

        let address = config
            .advertised
            .clone()
            .unwrap_or_else(|| node.advertised_addr().clone());
        let link = node.link().clone();
        let core = Arc::new(RelayCore::new(&config, address, link.clone(), sink.clone()));

        tracing::info!(
            "{} relaying on {} (advertised {}), next hop {}",
            config.local_name,
            node.local_addr(),
            core.local_address(),
            link.addr()
        );
        node.start(core.clone());

        let cancel = node.cancel_token();
        let stopped = CancellationToken::new();

        tokio::spawn(watch_next_hop(link, sink, cancel.clone()));
        tokio::spawn(evict_expired(
            core.clone(),
            config.tracker_cleanup_interval,
            cancel.clone(),
        ));
        {
            let cancel = cancel.clone();
            let stopped = stopped.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                node.shutdown().await;
                stopped.cancel();
            });
        }

        RuntimeChannels {
            handle: RuntimeHandle {
                core,
                cancel,
                stopped,
            },
            messages: msg_rx,
            notifications: notif_rx,
            status_changes: status_rx,
            events: event_rx,
        }
    }
}

/// Turn link state changes into `NextHopConnected`/`NextHopDisconnected`.
async fn watch_next_hop(link: NextHopLink, sink: Arc<dyn DeliverySink>, cancel: CancellationToken) {
    let mut rx = link.subscribe();
    let mut was_connected = *rx.borrow_and_update();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let connected = *rx.borrow_and_update();
        if connected == was_connected {
            continue;
        }
        was_connected = connected;
        let addr = link.addr().clone();
        if connected {
            sink.on_event(ProtocolEvent::NextHopConnected { addr });
        } else {
            tracing::warn!("lost connection to next hop {addr}");
            sink.on_event(ProtocolEvent::NextHopDisconnected { addr });
        }
    }
}

async fn evict_expired(
    core: Arc<RelayCore<NextHopLink>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => core.evict_expired(),
        }
    }
}
