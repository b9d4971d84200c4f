use serde::{Deserialize, Serialize};

/// Hop ceiling given to originated deliveries and synthesized notifications.
pub const DEFAULT_MAX_HOPS: u32 = 10;

/// Lifecycle of a message we originated.
///
/// Ordered: a tracked message only ever moves to a greater status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Built locally, not yet handed to the next hop.
    Pending = 0,
    /// Written to the next-hop connection.
    Sent = 1,
    /// Some, not all, recipients confirmed by notification.
    PartiallyDelivered = 2,
    /// Every recipient confirmed.
    Delivered = 3,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::PartiallyDelivered => "partially delivered",
            MessageStatus::Delivered => "delivered",
        };
        f.write_str(s)
    }
}
