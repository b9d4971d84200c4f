use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RingTransportError;
use crate::{PeerAddress, PeerName};

/// Fixed marker in notification IDs: `{parent_id}-notif-{recipient}`.
pub const NOTIFICATION_ID_SUFFIX: &str = "-notif";

/// Frame variant discriminator (the wire `type` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Delivery,
    Notification,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Delivery => "message",
            FrameKind::Notification => "notification",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content addressed to a set of ring peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFrame {
    pub id: String,
    pub sender: PeerName,
    pub sender_address: Option<PeerAddress>,
    /// Peers still waiting for this content. Shrinks as peers consume it.
    pub recipients: Vec<PeerName>,
    pub content: String,
    pub hop_count: u32,
    pub max_hops: u32,
    /// Unix seconds.
    pub timestamp: i64,
}

impl DeliveryFrame {
    /// New frame with `hop_count = 0` and the current timestamp.
    pub fn new(
        id: impl Into<String>,
        sender: PeerName,
        sender_address: Option<PeerAddress>,
        recipients: Vec<PeerName>,
        content: impl Into<String>,
        max_hops: u32,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            sender_address,
            recipients,
            content: content.into(),
            hop_count: 0,
            max_hops,
            timestamp: now_secs(),
        }
    }

    pub fn is_recipient(&self, name: &PeerName) -> bool {
        self.recipients.iter().any(|r| r == name)
    }

    /// Remove every occurrence of `name`. Returns whether it was present.
    pub fn remove_recipient(&mut self, name: &PeerName) -> bool {
        let before = self.recipients.len();
        self.recipients.retain(|r| r != name);
        self.recipients.len() != before
    }

    /// ID of the notification `recipient` emits after consuming this frame.
    pub fn notification_id(&self, recipient: &PeerName) -> String {
        format!("{}{NOTIFICATION_ID_SUFFIX}-{recipient}", self.id)
    }
}

/// "`sender` consumed a message originated by `original_sender`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFrame {
    pub id: String,
    /// The peer that consumed the original message.
    pub sender: PeerName,
    pub sender_address: Option<PeerAddress>,
    /// Copy of the original content.
    pub content: String,
    pub original_sender: PeerName,
    pub original_address: Option<PeerAddress>,
    pub hop_count: u32,
    pub max_hops: u32,
    pub timestamp: i64,
}

impl NotificationFrame {
    /// ID of the delivery frame this notification acknowledges, if the
    /// notification ID follows the `{parent}-notif[-{sender}]` shape.
    pub fn parent_id(&self) -> Option<&str> {
        let with_sender = format!("{NOTIFICATION_ID_SUFFIX}-{}", self.sender);
        self.id
            .strip_suffix(with_sender.as_str())
            .or_else(|| self.id.strip_suffix(NOTIFICATION_ID_SUFFIX))
            .filter(|parent| !parent.is_empty())
    }
}

/// Unit exchanged between ring peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireFrame", into = "WireFrame")]
pub enum Frame {
    Delivery(DeliveryFrame),
    Notification(NotificationFrame),
}

impl Frame {
    pub fn id(&self) -> &str {
        match self {
            Frame::Delivery(f) => &f.id,
            Frame::Notification(f) => &f.id,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Delivery(_) => FrameKind::Delivery,
            Frame::Notification(_) => FrameKind::Notification,
        }
    }

    pub fn sender(&self) -> &PeerName {
        match self {
            Frame::Delivery(f) => &f.sender,
            Frame::Notification(f) => &f.sender,
        }
    }

    pub fn hop_count(&self) -> u32 {
        match self {
            Frame::Delivery(f) => f.hop_count,
            Frame::Notification(f) => f.hop_count,
        }
    }

    pub fn max_hops(&self) -> u32 {
        match self {
            Frame::Delivery(f) => f.max_hops,
            Frame::Notification(f) => f.max_hops,
        }
    }

    /// Terminal: a frame at or past its ceiling is never processed.
    pub fn hop_limit_reached(&self) -> bool {
        self.hop_count() >= self.max_hops()
    }

    /// Check the well-formedness rules for the frame's variant.
    pub fn validate(&self) -> Result<(), RingTransportError> {
        if self.id().is_empty() {
            return Err(RingTransportError::invalid_frame("frame ID is empty"));
        }
        if self.sender().is_empty() {
            return Err(RingTransportError::invalid_frame("sender is empty"));
        }
        match self {
            Frame::Delivery(f) => {
                if f.recipients.is_empty() {
                    return Err(RingTransportError::invalid_frame("recipients list is empty"));
                }
                if f.content.is_empty() {
                    return Err(RingTransportError::invalid_frame("content is empty"));
                }
                if f.max_hops == 0 {
                    return Err(RingTransportError::invalid_frame("invalid max hops"));
                }
            }
            Frame::Notification(f) => {
                if f.content.is_empty() {
                    return Err(RingTransportError::invalid_frame("content is empty"));
                }
                if f.sender_address.is_none() {
                    return Err(RingTransportError::invalid_frame(
                        "sender address is missing in notification",
                    ));
                }
                if f.original_sender.is_empty() {
                    return Err(RingTransportError::invalid_frame(
                        "original sender is empty in notification",
                    ));
                }
                if f.original_address.is_none() {
                    return Err(RingTransportError::invalid_frame(
                        "original sender address is missing in notification",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl From<DeliveryFrame> for Frame {
    fn from(f: DeliveryFrame) -> Self {
        Frame::Delivery(f)
    }
}

impl From<NotificationFrame> for Frame {
    fn from(f: NotificationFrame) -> Self {
        Frame::Notification(f)
    }
}

/// Current Unix time in seconds.
#[inline]
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── Wire layout ──────────────────────────────────────────────────────

/// Flat JSON object as it travels between peers.
///
/// Addresses are split into ip/port strings; missing fields default so
/// that frames from older peers (no `type`, no addresses) still decode.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct WireFrame {
    id: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    sender: String,
    sender_ip: String,
    sender_port: String,
    recipients: Option<Vec<PeerName>>,
    content: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    original_sender: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    original_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    original_port: String,
    hop_count: u32,
    max_hops: u32,
    timestamp: i64,
}

fn split_address(addr: &Option<PeerAddress>) -> (String, String) {
    match addr {
        Some(a) => (a.host().to_string(), a.port().to_string()),
        None => (String::new(), String::new()),
    }
}

impl TryFrom<WireFrame> for Frame {
    type Error = RingTransportError;

    fn try_from(w: WireFrame) -> Result<Self, Self::Error> {
        let sender_address = PeerAddress::from_parts(&w.sender_ip, &w.sender_port);
        match w.kind.as_deref().unwrap_or("message") {
            "message" => Ok(Frame::Delivery(DeliveryFrame {
                id: w.id,
                sender: w.sender.into(),
                sender_address,
                recipients: w.recipients.unwrap_or_default(),
                content: w.content,
                hop_count: w.hop_count,
                max_hops: w.max_hops,
                timestamp: w.timestamp,
            })),
            "notification" => Ok(Frame::Notification(NotificationFrame {
                id: w.id,
                sender: w.sender.into(),
                sender_address,
                content: w.content,
                original_sender: w.original_sender.into(),
                original_address: PeerAddress::from_parts(&w.original_ip, &w.original_port),
                hop_count: w.hop_count,
                max_hops: w.max_hops,
                timestamp: w.timestamp,
            })),
            other => Err(RingTransportError::UnknownFrameType(other.to_string())),
        }
    }
}

impl From<Frame> for WireFrame {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Delivery(f) => {
                let (sender_ip, sender_port) = split_address(&f.sender_address);
                WireFrame {
                    id: f.id,
                    kind: Some(FrameKind::Delivery.as_str().to_string()),
                    sender: f.sender.to_string(),
                    sender_ip,
                    sender_port,
                    recipients: Some(f.recipients),
                    content: f.content,
                    hop_count: f.hop_count,
                    max_hops: f.max_hops,
                    timestamp: f.timestamp,
                    ..Default::default()
                }
            }
            Frame::Notification(f) => {
                let (sender_ip, sender_port) = split_address(&f.sender_address);
                let (original_ip, original_port) = split_address(&f.original_address);
                WireFrame {
                    id: f.id,
                    kind: Some(FrameKind::Notification.as_str().to_string()),
                    sender: f.sender.to_string(),
                    sender_ip,
                    sender_port,
                    recipients: None,
                    content: f.content,
                    original_sender: f.original_sender.to_string(),
                    original_ip,
                    original_port,
                    hop_count: f.hop_count,
                    max_hops: f.max_hops,
                    timestamp: f.timestamp,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery() -> DeliveryFrame {
        DeliveryFrame {
            id: "P1-1700000000".into(),
            sender: "P1".into(),
            sender_address: Some(PeerAddress::new("10.0.0.1", 9651)),
            recipients: vec!["P2".into(), "P4".into()],
            content: "hello ring".into(),
            hop_count: 0,
            max_hops: 10,
            timestamp: 1_700_000_000,
        }
    }

    fn notification() -> NotificationFrame {
        NotificationFrame {
            id: "P1-1700000000-notif-P2".into(),
            sender: "P2".into(),
            sender_address: Some(PeerAddress::new("10.0.0.2", 9651)),
            content: "hello ring".into(),
            original_sender: "P1".into(),
            original_address: Some(PeerAddress::new("10.0.0.1", 9651)),
            hop_count: 0,
            max_hops: 10,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn delivery_wire_layout() {
        let json = serde_json::to_value(Frame::Delivery(delivery())).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["sender_ip"], "10.0.0.1");
        assert_eq!(json["sender_port"], "9651");
        assert_eq!(json["recipients"], serde_json::json!(["P2", "P4"]));
        assert_eq!(json["hop_count"], 0);
        assert!(json.get("original_sender").is_none());
    }

    #[test]
    fn notification_wire_layout() {
        let json = serde_json::to_value(Frame::Notification(notification())).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["original_sender"], "P1");
        assert_eq!(json["original_ip"], "10.0.0.1");
        assert_eq!(json["original_port"], "9651");
        assert!(json["recipients"].is_null());
    }

    #[test]
    fn decode_frame_from_legacy_peer() {
        // Older peers send neither `type` nor addresses.
        let line = r#"{"id":"a-1","sender":"A","recipients":["B"],"content":"hi","hop_count":2,"max_hops":10,"timestamp":5}"#;
        let frame: Frame = serde_json::from_str(line).unwrap();
        match frame {
            Frame::Delivery(f) => {
                assert_eq!(f.hop_count, 2);
                assert_eq!(f.recipients, vec![PeerName::from("B")]);
                assert!(f.sender_address.is_none());
            }
            other => panic!("expected delivery, got {other:?}"),
        }
    }

    #[test]
    fn decode_ignores_unknown_fields_and_null_recipients() {
        let line = r#"{"id":"x-notif","type":"notification","sender":"B","sender_ip":"h","sender_port":"1",
            "recipients":null,"content":"c","original_sender":"A","original_ip":"h","original_port":"2",
            "hop_count":0,"max_hops":10,"timestamp":0,"extra":{"nested":true}}"#;
        let frame: Frame = serde_json::from_str(line).unwrap();
        assert_eq!(frame.kind(), FrameKind::Notification);
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn decode_rejects_unknown_type_and_negative_hops() {
        let unknown = r#"{"id":"1","type":"ping","sender":"A"}"#;
        assert!(serde_json::from_str::<Frame>(unknown).is_err());

        let negative = r#"{"id":"1","sender":"A","recipients":["B"],"content":"c","hop_count":-1,"max_hops":10}"#;
        assert!(serde_json::from_str::<Frame>(negative).is_err());
    }

    #[test]
    fn wire_roundtrip_preserves_frames() {
        for frame in [Frame::Delivery(delivery()), Frame::Notification(notification())] {
            let json = serde_json::to_string(&frame).unwrap();
            let back: Frame = serde_json::from_str(&json).unwrap();
            assert_eq!(back, frame);
        }
    }

    #[test]
    fn validate_delivery_rules() {
        assert!(Frame::Delivery(delivery()).validate().is_ok());

        let mut f = delivery();
        f.recipients.clear();
        assert!(Frame::Delivery(f).validate().is_err());

        let mut f = delivery();
        f.content.clear();
        assert!(Frame::Delivery(f).validate().is_err());

        let mut f = delivery();
        f.max_hops = 0;
        assert!(Frame::Delivery(f).validate().is_err());

        let mut f = delivery();
        f.id.clear();
        assert!(Frame::Delivery(f).validate().is_err());

        // Sender address is optional for deliveries.
        let mut f = delivery();
        f.sender_address = None;
        assert!(Frame::Delivery(f).validate().is_ok());
    }

    #[test]
    fn validate_notification_rules() {
        assert!(Frame::Notification(notification()).validate().is_ok());

        let mut n = notification();
        n.sender_address = None;
        assert!(Frame::Notification(n).validate().is_err());

        let mut n = notification();
        n.original_sender = PeerName::default();
        assert!(Frame::Notification(n).validate().is_err());

        let mut n = notification();
        n.original_address = None;
        assert!(Frame::Notification(n).validate().is_err());

        let mut n = notification();
        n.content.clear();
        assert!(Frame::Notification(n).validate().is_err());
    }

    #[test]
    fn hop_limit_is_inclusive() {
        let mut f = delivery();
        f.hop_count = 9;
        assert!(!Frame::Delivery(f.clone()).hop_limit_reached());
        f.hop_count = 10;
        assert!(Frame::Delivery(f).hop_limit_reached());
    }

    #[test]
    fn recipient_removal() {
        let mut f = delivery();
        assert!(f.is_recipient(&"P2".into()));
        assert!(f.remove_recipient(&"P2".into()));
        assert!(!f.remove_recipient(&"P2".into()));
        assert_eq!(f.recipients, vec![PeerName::from("P4")]);
    }

    #[test]
    fn notification_ids_derive_from_parent() {
        let f = delivery();
        assert_eq!(f.notification_id(&"P2".into()), "P1-1700000000-notif-P2");
        assert_ne!(f.notification_id(&"P2".into()), f.notification_id(&"P4".into()));

        assert_eq!(notification().parent_id(), Some("P1-1700000000"));

        let mut legacy = notification();
        legacy.id = "P1-1700000000-notif".into();
        assert_eq!(legacy.parent_id(), Some("P1-1700000000"));

        let mut unrelated = notification();
        unrelated.id = "something-else".into();
        assert_eq!(unrelated.parent_id(), None);
    }
}
