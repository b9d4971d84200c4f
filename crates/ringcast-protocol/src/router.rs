/// Ring routing engine for ringcast.
///
/// Pure decision logic: receives a frame, returns a `RoutingAction`
/// telling the caller what to do (deliver, surface a notification,
/// forward, reject, drop). No I/O, no transport dependency.
///
/// Routing is ring-only. Every forward goes to the single next hop; the
/// router never picks a destination.
use std::collections::HashSet;

use ringcast_transport::{
    DeliveryFrame, Frame, NotificationFrame, PeerAddress, PeerName, RingTransportError,
};

use crate::types::DEFAULT_MAX_HOPS;

// ── Routing decisions ──────────────────────────────────────────────────

/// What to do with an incoming frame.
#[derive(Debug)]
pub enum RoutingAction {
    /// We are a recipient. `message` is the frame as it arrived.
    /// `notification` goes back around the ring to the sender (absent for
    /// self-delivery). `forward` is the stripped frame for the remaining
    /// recipients.
    Deliver {
        message: DeliveryFrame,
        notification: Option<NotificationFrame>,
        forward: Option<DeliveryFrame>,
    },
    /// First sighting of a notification. `forward` is absent once it has
    /// reached the original sender.
    Notify {
        notice: NotificationFrame,
        forward: Option<NotificationFrame>,
    },
    /// Not for us; pass it on (hop count already incremented).
    Forward { frame: Frame },
    /// Malformed frame.
    Reject { reason: String },
    /// Terminal, nothing to do.
    Drop { reason: DropReason },
}

/// Why a frame ended here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// `hop_count >= max_hops` on arrival.
    HopLimit,
    /// Notification ID already processed by this peer.
    DuplicateNotification,
    /// Delivery ID already consumed here and no recipients remain.
    DuplicateDelivery,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::HopLimit => "hop limit reached",
            DropReason::DuplicateNotification => "notification already processed",
            DropReason::DuplicateDelivery => "delivery already processed",
        };
        f.write_str(s)
    }
}

// ── Router ─────────────────────────────────────────────────────────────

/// Pure routing engine, one per peer.
///
/// Call `route()` with an incoming frame, act on the returned `RoutingAction`.
/// The seen-sets live for the life of the router.
pub struct Router {
    local_name: PeerName,
    local_address: PeerAddress,
    default_max_hops: u32,
    dedup_deliveries: bool,
    /// Notification IDs already surfaced/forwarded.
    seen_notifications: HashSet<String>,
    /// Delivery IDs already consumed locally.
    seen_deliveries: HashSet<String>,
}

impl Router {
    pub fn new(local_name: PeerName, local_address: PeerAddress) -> Self {
        Self {
            local_name,
            local_address,
            default_max_hops: DEFAULT_MAX_HOPS,
            dedup_deliveries: true,
            seen_notifications: HashSet::new(),
            seen_deliveries: HashSet::new(),
        }
    }

    /// Hop ceiling for frames this router creates.
    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.default_max_hops = max_hops;
        self
    }

    /// Whether a delivery ID seen before is consumed again.
    pub fn with_delivery_dedup(mut self, enabled: bool) -> Self {
        self.dedup_deliveries = enabled;
        self
    }

    pub fn local_name(&self) -> &PeerName {
        &self.local_name
    }

    pub fn local_address(&self) -> &PeerAddress {
        &self.local_address
    }

    pub fn default_max_hops(&self) -> u32 {
        self.default_max_hops
    }

    /// Build a fresh delivery frame originated by this peer.
    pub fn originate(
        &self,
        id: impl Into<String>,
        recipients: Vec<PeerName>,
        content: impl Into<String>,
    ) -> Result<DeliveryFrame, RingTransportError> {
        let frame = DeliveryFrame::new(
            id,
            self.local_name.clone(),
            Some(self.local_address.clone()),
            recipients,
            content,
            self.default_max_hops,
        );
        Frame::Delivery(frame.clone()).validate()?;
        Ok(frame)
    }

    /// Route an incoming frame. Returns the action to take.
    pub fn route(&mut self, frame: Frame) -> RoutingAction {
        if let Err(e) = frame.validate() {
            return RoutingAction::Reject {
                reason: e.to_string(),
            };
        }
        if frame.hop_limit_reached() {
            return RoutingAction::Drop {
                reason: DropReason::HopLimit,
            };
        }
        match frame {
            Frame::Delivery(f) => self.route_delivery(f),
            Frame::Notification(n) => self.route_notification(n),
        }
    }

    fn route_delivery(&mut self, mut frame: DeliveryFrame) -> RoutingAction {
        if !frame.is_recipient(&self.local_name) {
            frame.hop_count += 1;
            return RoutingAction::Forward {
                frame: Frame::Delivery(frame),
            };
        }

        let message = frame.clone();
        frame.remove_recipient(&self.local_name);

        if self.dedup_deliveries && !self.seen_deliveries.insert(frame.id.clone()) {
            tracing::debug!("delivery {} already consumed, not delivering again", frame.id);
            if frame.recipients.is_empty() {
                return RoutingAction::Drop {
                    reason: DropReason::DuplicateDelivery,
                };
            }
            frame.hop_count += 1;
            return RoutingAction::Forward {
                frame: Frame::Delivery(frame),
            };
        }

        // Self-delivery needs no receipt.
        let notification = if frame.sender == self.local_name {
            None
        } else {
            self.notification_for(&message)
        };
        frame.hop_count += 1;
        let forward = (!frame.recipients.is_empty()).then_some(frame);

        RoutingAction::Deliver {
            message,
            notification,
            forward,
        }
    }

    fn route_notification(&mut self, mut notice: NotificationFrame) -> RoutingAction {
        if !self.seen_notifications.insert(notice.id.clone()) {
            return RoutingAction::Drop {
                reason: DropReason::DuplicateNotification,
            };
        }

        if notice.original_sender == self.local_name {
            return RoutingAction::Notify {
                notice,
                forward: None,
            };
        }

        let surfaced = notice.clone();
        notice.hop_count += 1;
        RoutingAction::Notify {
            notice: surfaced,
            forward: Some(notice),
        }
    }

    /// Notification acknowledging our consumption of `parent`.
    ///
    /// `None` when the parent carries no sender address: the result would
    /// not be a well-formed notification.
    fn notification_for(&self, parent: &DeliveryFrame) -> Option<NotificationFrame> {
        let Some(original_address) = parent.sender_address.clone() else {
            tracing::warn!(
                "message {} from {} has no sender address, skipping notification",
                parent.id,
                parent.sender
            );
            return None;
        };
        Some(NotificationFrame {
            id: parent.notification_id(&self.local_name),
            sender: self.local_name.clone(),
            sender_address: Some(self.local_address.clone()),
            content: parent.content.clone(),
            original_sender: parent.sender.clone(),
            original_address: Some(original_address),
            hop_count: 0,
            max_hops: self.default_max_hops,
            timestamp: parent.timestamp,
        })
    }

    /// Number of notification IDs remembered.
    pub fn seen_notification_count(&self) -> usize {
        self.seen_notifications.len()
    }

    /// Number of delivery IDs remembered.
    pub fn seen_delivery_count(&self) -> usize {
        self.seen_deliveries.len()
    }
}
