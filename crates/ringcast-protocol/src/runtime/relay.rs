//! Relay core: the per-peer state behind every inbound connection.
//!
//! Each structure has its own lock, held only for in-memory work and never
//! across a forward. Frames from different connections are processed
//! concurrently.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringcast_metrics::{MetricsSnapshot, RelayMetrics};
use ringcast_transport::{
    DeliveryFrame, Frame, FrameHandler, NotificationFrame, PeerAddress, PeerName,
    RingTransportError,
};

use crate::directory::{PeerDirectory, PeerRecord};
use crate::error::RingProtocolError;
use crate::ledger::{DeliveryLedger, LedgerEntry};
use crate::router::{DropReason, Router, RoutingAction};
use crate::tracker::{MessageTracker, TrackedStatus};

use super::sink::DeliverySink;
use super::transport::Transport;
use super::{DeliveredMessage, NotificationReceived, ProtocolEvent, RuntimeConfig};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RelayCore<T: Transport> {
    local_name: PeerName,
    local_address: PeerAddress,
    router: Mutex<Router>,
    directory: Mutex<PeerDirectory>,
    ledger: Mutex<DeliveryLedger>,
    tracker: Mutex<MessageTracker>,
    transport: T,
    sink: Arc<dyn DeliverySink>,
    metrics: RelayMetrics,
}

impl<T: Transport> RelayCore<T> {
    pub fn new(
        config: &RuntimeConfig,
        local_address: PeerAddress,
        transport: T,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        let local_name = config.local_name.clone();
        let router = Router::new(local_name.clone(), local_address.clone())
            .with_max_hops(config.default_max_hops)
            .with_delivery_dedup(config.dedup_deliveries);
        Self {
            local_name,
            local_address,
            router: Mutex::new(router),
            directory: Mutex::new(PeerDirectory::new()),
            ledger: Mutex::new(DeliveryLedger::new()),
            tracker: Mutex::new(MessageTracker::new()),
            transport,
            sink,
            metrics: RelayMetrics::default(),
        }
    }

    pub fn local_name(&self) -> &PeerName {
        &self.local_name
    }

    pub fn local_address(&self) -> &PeerAddress {
        &self.local_address
    }

    pub fn next_hop_connected(&self) -> bool {
        self.transport.is_connected()
    }

    // ── Originate ─────────────────────────────────────────────────────

    /// Send `content` around the ring to `recipients`. Returns the frame ID.
    ///
    /// Names are trimmed; empty and repeated names are dropped, order is
    /// kept. The frame goes straight to the next hop: the originator never
    /// matches itself as a recipient here, only when the frame comes back.
    pub async fn originate<I, S>(&self, recipients: I, content: &str) -> Result<String, RingProtocolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recipients = normalize_recipients(recipients);
        let id = uuid::Uuid::new_v4().to_string();

        let frame = lock(&self.router)
            .originate(id.clone(), recipients, content)
            .map_err(|e| match e {
                RingTransportError::InvalidFrame { reason } => {
                    RingProtocolError::InvalidFrame { reason }
                }
                other => RingProtocolError::Transport(other),
            })?;

        let tracked = lock(&self.tracker).track(id.clone(), &frame.recipients);
        match tracked {
            Some(change) => self.sink.on_status_change(change),
            None => tracing::warn!("message tracker full, {id} will not be tracked"),
        }

        let recipients_display = join_names(&frame.recipients);
        let frame = Frame::Delivery(frame);
        match self.transport.forward(&frame).await {
            Ok(()) => {
                self.metrics.frames_forwarded.inc();
                tracing::info!("Sent message {id} to {recipients_display}");
                let change = lock(&self.tracker).mark_sent(&id);
                if let Some(change) = change {
                    self.sink.on_status_change(change);
                }
                Ok(id)
            }
            Err(e) => {
                self.metrics.forward_failures.inc();
                lock(&self.tracker).remove(&id);
                tracing::warn!("could not send message {id}: {e}");
                Err(RingProtocolError::NextHopUnavailable {
                    frame_id: id,
                    reason: e.to_string(),
                })
            }
        }
    }

    // ── Receive ───────────────────────────────────────────────────────

    /// Process one inbound frame.
    pub async fn receive(&self, frame: Frame) {
        self.metrics.frames_received.inc();
        let id = frame.id().to_string();
        let kind = frame.kind();

        let action = lock(&self.router).route(frame);
        match action {
            RoutingAction::Reject { reason } => {
                self.metrics.frames_rejected.inc();
                tracing::warn!("rejected {kind} {id}: {reason}");
                self.sink.on_event(ProtocolEvent::FrameRejected { id, reason });
            }
            RoutingAction::Drop { reason } => {
                match reason {
                    DropReason::HopLimit => {
                        self.metrics.hop_limit_drops.inc();
                        tracing::info!("Max hops reached for {kind} {id}. Discarding.");
                    }
                    DropReason::DuplicateNotification | DropReason::DuplicateDelivery => {
                        self.metrics.duplicates_dropped.inc();
                        tracing::info!("Already processed {kind} {id}. Discarding.");
                    }
                }
                self.sink.on_event(ProtocolEvent::FrameDropped { id, reason });
            }
            RoutingAction::Deliver {
                message,
                notification,
                forward,
            } => {
                self.deliver_local(message);
                if let Some(notification) = notification {
                    self.forward(Frame::Notification(notification)).await;
                }
                if let Some(frame) = forward {
                    self.forward(Frame::Delivery(frame)).await;
                }
            }
            RoutingAction::Notify { notice, forward } => {
                self.surface_notification(notice, forward.is_none());
                if let Some(frame) = forward {
                    self.forward(Frame::Notification(frame)).await;
                }
            }
            RoutingAction::Forward { frame } => {
                self.forward(frame).await;
            }
        }
    }

    fn deliver_local(&self, message: DeliveryFrame) {
        self.metrics.local_deliveries.inc();
        tracing::info!("Received message from {}: {}", message.sender, message.content);

        lock(&self.ledger).record_local(
            &self.local_name,
            LedgerEntry {
                id: message.id.clone(),
                sender: message.sender.clone(),
                content: message.content.clone(),
                timestamp: message.timestamp,
            },
        );

        // A message we sent to ourselves confirms itself on the way back.
        if message.sender == self.local_name {
            let change = lock(&self.tracker).confirm(&message.id, &self.local_name);
            if let Some(change) = change {
                self.sink.on_status_change(change);
            }
        }

        self.sink.on_local_delivery(DeliveredMessage {
            id: message.id,
            from: message.sender,
            content: message.content,
            timestamp: message.timestamp,
            hop_count: message.hop_count,
        });
    }

    fn surface_notification(&self, notice: NotificationFrame, addressed_to_us: bool) {
        self.metrics.notifications_surfaced.inc();
        let parent_id = notice.parent_id().map(str::to_string);

        if let Some(address) = notice.sender_address.clone() {
            if lock(&self.directory).upsert(notice.sender.clone(), address.clone()) {
                tracing::debug!("peer {} is at {address}", notice.sender);
            }
        }

        lock(&self.ledger).record_reported(
            notice.sender.clone(),
            LedgerEntry {
                id: parent_id.clone().unwrap_or_else(|| notice.id.clone()),
                sender: notice.original_sender.clone(),
                content: notice.content.clone(),
                timestamp: notice.timestamp,
            },
        );

        if addressed_to_us {
            tracing::info!("{} received your message: {}", notice.sender, notice.content);
            if let Some(parent) = parent_id.as_deref() {
                let change = lock(&self.tracker).confirm(parent, &notice.sender);
                if let Some(change) = change {
                    self.sink.on_status_change(change);
                }
            }
        } else {
            tracing::info!(
                "{} received a message from {}",
                notice.sender,
                notice.original_sender
            );
        }

        self.sink.on_notification(NotificationReceived {
            id: notice.id,
            parent_id,
            recipient: notice.sender,
            recipient_address: notice.sender_address,
            original_sender: notice.original_sender,
            content: notice.content,
            timestamp: notice.timestamp,
            addressed_to_us,
        });
    }

    /// Best-effort forward. A failure is logged and counted; the frame is lost.
    async fn forward(&self, frame: Frame) {
        match self.transport.forward(&frame).await {
            Ok(()) => {
                self.metrics.frames_forwarded.inc();
                tracing::info!(
                    "Forwarded {} {} to next hop (hop {}/{})",
                    frame.kind(),
                    frame.id(),
                    frame.hop_count(),
                    frame.max_hops()
                );
            }
            Err(e) => {
                self.metrics.forward_failures.inc();
                tracing::warn!("dropping {} {}: {e}", frame.kind(), frame.id());
                self.sink.on_event(ProtocolEvent::ForwardFailed {
                    id: frame.id().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Messages delivered to this peer, oldest first.
    pub fn delivered(&self) -> Vec<LedgerEntry> {
        lock(&self.ledger).local().to_vec()
    }

    /// Everything known about who received what.
    pub fn received_by_peer(&self) -> BTreeMap<PeerName, Vec<LedgerEntry>> {
        lock(&self.ledger).by_recipient().clone()
    }

    pub fn peers(&self) -> Vec<PeerRecord> {
        lock(&self.directory).peers()
    }

    pub fn status(&self, message_id: &str) -> Option<TrackedStatus> {
        lock(&self.tracker).details(message_id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop tracked messages past their age limit.
    pub fn evict_expired(&self) {
        lock(&self.tracker).evict_expired();
    }
}

#[async_trait::async_trait]
impl<T: Transport> FrameHandler for RelayCore<T> {
    async fn handle_frame(&self, from: SocketAddr, frame: Frame) {
        tracing::trace!("{} {} from {from}", frame.kind(), frame.id());
        self.receive(frame).await;
    }
}

impl<T: Transport> std::fmt::Debug for RelayCore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCore")
            .field("local_name", &self.local_name)
            .field("local_address", &self.local_address)
            .finish()
    }
}

fn normalize_recipients<I, S>(recipients: I) -> Vec<PeerName>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .map(|r| r.as_ref().trim().to_string())
        .filter(|r| !r.is_empty() && seen.insert(r.clone()))
        .map(PeerName::from)
        .collect()
}

fn join_names(names: &[PeerName]) -> String {
    names
        .iter()
        .map(PeerName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
