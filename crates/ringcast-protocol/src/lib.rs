//! ringcast protocol layer.
//!
//! Implements ring relaying on top of `ringcast-transport`: hop limits,
//! recipient stripping, delivery notifications that travel back round the
//! ring, and seen-set deduplication. Every peer forwards only to its single
//! next hop.
//!
//! Delivery is best-effort: a frame that cannot be forwarded while the next
//! hop is down is lost.

pub mod directory;
pub mod error;
pub mod ledger;
pub mod router;
pub mod runtime;
pub mod tracker;
pub mod types;

pub use directory::{PeerDirectory, PeerRecord};
pub use error::RingProtocolError;
pub use ledger::{DeliveryLedger, LedgerEntry};
pub use router::{DropReason, Router, RoutingAction};
pub use runtime::{
    ChannelSink, DeliveredMessage, DeliverySink, NotificationReceived, ProtocolEvent, RelayCore,
    RingRuntime, RuntimeChannels, RuntimeConfig, RuntimeHandle, Transport,
};
pub use tracker::{MessageTracker, StatusChange, TrackedStatus};
pub use types::{MessageStatus, DEFAULT_MAX_HOPS};

pub use ringcast_transport::{PeerAddress, PeerName};
