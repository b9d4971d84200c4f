/// Lifecycle tracker for messages this peer originated.
///
/// Tracks the status pipeline: Pending → Sent → PartiallyDelivered → Delivered.
/// Status is monotonically increasing, no regression allowed.
///
/// Pure logic, no I/O. The caller feeds events (forward result, returning
/// notifications), the tracker updates status and reports transitions.
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use ringcast_transport::PeerName;

use crate::types::MessageStatus;

/// Maximum number of tracked messages.
const MAX_TRACKED: usize = 10_000;

/// Maximum age for a tracked message before it is evicted (24h).
const MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// A status transition event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub message_id: String,
    pub previous: MessageStatus,
    pub current: MessageStatus,
}

#[derive(Debug, Clone)]
struct TrackedMessage {
    status: MessageStatus,
    awaiting: HashSet<PeerName>,
    confirmed: Vec<PeerName>,
    created: Instant,
}

/// Read-only view of a tracked message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedStatus {
    pub status: MessageStatus,
    /// Recipients that confirmed, in confirmation order.
    pub confirmed: Vec<PeerName>,
    /// Recipients not heard from yet, sorted.
    pub awaiting: Vec<PeerName>,
}

#[derive(Debug, Default)]
pub struct MessageTracker {
    messages: HashMap<String, TrackedMessage>,
}

impl MessageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new outgoing message.
    ///
    /// Returns `None` if at capacity even after evicting expired entries.
    pub fn track(&mut self, message_id: String, recipients: &[PeerName]) -> Option<StatusChange> {
        if self.messages.len() >= MAX_TRACKED {
            self.evict_expired();
            if self.messages.len() >= MAX_TRACKED {
                return None;
            }
        }

        self.messages.insert(
            message_id.clone(),
            TrackedMessage {
                status: MessageStatus::Pending,
                awaiting: recipients.iter().cloned().collect(),
                confirmed: Vec::new(),
                created: Instant::now(),
            },
        );

        Some(StatusChange {
            message_id,
            previous: MessageStatus::Pending,
            current: MessageStatus::Pending,
        })
    }

    /// Mark a message as written to the next hop.
    pub fn mark_sent(&mut self, message_id: &str) -> Option<StatusChange> {
        self.advance(message_id, MessageStatus::Sent)
    }

    /// Record that `recipient` consumed the message.
    ///
    /// Unknown messages, non-recipients and repeat confirmations are ignored.
    pub fn confirm(&mut self, message_id: &str, recipient: &PeerName) -> Option<StatusChange> {
        let entry = self.messages.get_mut(message_id)?;
        if !entry.awaiting.remove(recipient) {
            return None;
        }
        entry.confirmed.push(recipient.clone());

        let next = if entry.awaiting.is_empty() {
            MessageStatus::Delivered
        } else {
            MessageStatus::PartiallyDelivered
        };
        self.advance(message_id, next)
    }

    /// Get the current status of a tracked message.
    pub fn status(&self, message_id: &str) -> Option<MessageStatus> {
        self.messages.get(message_id).map(|m| m.status)
    }

    /// Status plus per-recipient detail.
    pub fn details(&self, message_id: &str) -> Option<TrackedStatus> {
        self.messages.get(message_id).map(|m| {
            let mut awaiting: Vec<PeerName> = m.awaiting.iter().cloned().collect();
            awaiting.sort();
            TrackedStatus {
                status: m.status,
                confirmed: m.confirmed.clone(),
                awaiting,
            }
        })
    }

    /// Number of currently tracked messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Stop tracking a message (e.g. it never left this peer).
    pub fn remove(&mut self, message_id: &str) -> bool {
        self.messages.remove(message_id).is_some()
    }

    /// Evict messages older than 24h.
    pub fn evict_expired(&mut self) {
        let now = Instant::now();
        self.messages
            .retain(|_, m| now.duration_since(m.created) < MAX_AGE);
    }

    // ── Internal ───────────────────────────────────────────────────────

    /// Advance a message to a new status. Only forward transitions are allowed.
    fn advance(&mut self, message_id: &str, new_status: MessageStatus) -> Option<StatusChange> {
        let entry = self.messages.get_mut(message_id)?;

        if new_status <= entry.status {
            return None;
        }

        let previous = entry.status;
        entry.status = new_status;

        Some(StatusChange {
            message_id: message_id.to_string(),
            previous,
            current: new_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<PeerName> {
        list.iter().map(|n| PeerName::from(*n)).collect()
    }

    #[test]
    fn track_new_message() {
        let mut tracker = MessageTracker::new();
        let change = tracker.track("msg-1".into(), &names(&["P2"]));
        assert!(change.is_some());
        assert_eq!(tracker.status("msg-1"), Some(MessageStatus::Pending));
    }

    #[test]
    fn full_lifecycle() {
        let mut tracker = MessageTracker::new();
        tracker.track("msg-1".into(), &names(&["P2", "P4"]));

        let c1 = tracker.mark_sent("msg-1").unwrap();
        assert_eq!(c1.previous, MessageStatus::Pending);
        assert_eq!(c1.current, MessageStatus::Sent);

        let c2 = tracker.confirm("msg-1", &"P4".into()).unwrap();
        assert_eq!(c2.previous, MessageStatus::Sent);
        assert_eq!(c2.current, MessageStatus::PartiallyDelivered);

        let c3 = tracker.confirm("msg-1", &"P2".into()).unwrap();
        assert_eq!(c3.previous, MessageStatus::PartiallyDelivered);
        assert_eq!(c3.current, MessageStatus::Delivered);

        let details = tracker.details("msg-1").unwrap();
        assert_eq!(details.confirmed, names(&["P4", "P2"]));
        assert!(details.awaiting.is_empty());
    }

    #[test]
    fn single_recipient_goes_straight_to_delivered() {
        let mut tracker = MessageTracker::new();
        tracker.track("msg-1".into(), &names(&["P2"]));
        tracker.mark_sent("msg-1");
        let change = tracker.confirm("msg-1", &"P2".into()).unwrap();
        assert_eq!(change.current, MessageStatus::Delivered);
    }

    #[test]
    fn no_regression() {
        let mut tracker = MessageTracker::new();
        tracker.track("msg-1".into(), &names(&["P2"]));
        tracker.confirm("msg-1", &"P2".into());

        // A late Sent (confirmation raced the write) must not regress.
        assert!(tracker.mark_sent("msg-1").is_none());
        assert_eq!(tracker.status("msg-1"), Some(MessageStatus::Delivered));
    }

    #[test]
    fn repeat_and_stranger_confirmations_ignored() {
        let mut tracker = MessageTracker::new();
        tracker.track("msg-1".into(), &names(&["P2", "P4"]));
        tracker.mark_sent("msg-1");

        assert!(tracker.confirm("msg-1", &"P2".into()).is_some());
        assert!(tracker.confirm("msg-1", &"P2".into()).is_none());
        assert!(tracker.confirm("msg-1", &"P9".into()).is_none());
        assert!(tracker.confirm("unknown", &"P2".into()).is_none());
        assert_eq!(
            tracker.status("msg-1"),
            Some(MessageStatus::PartiallyDelivered)
        );
    }

    #[test]
    fn remove_and_len() {
        let mut tracker = MessageTracker::new();
        assert!(tracker.is_empty());
        tracker.track("msg-1".into(), &names(&["P2"]));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.remove("msg-1"));
        assert!(!tracker.remove("msg-1"));
        assert!(tracker.status("msg-1").is_none());
    }

    #[test]
    fn capacity_is_bounded() {
        let mut tracker = MessageTracker::new();
        let to = names(&["P2"]);
        for i in 0..MAX_TRACKED {
            assert!(tracker.track(format!("msg-{i}"), &to).is_some());
        }
        // Nothing expired yet, so the next one is refused.
        assert!(tracker.track("one-too-many".into(), &to).is_none());
        assert_eq!(tracker.len(), MAX_TRACKED);
    }
}
