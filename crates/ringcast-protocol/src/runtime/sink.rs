use tokio::sync::mpsc;

use crate::tracker::StatusChange;

use super::{DeliveredMessage, NotificationReceived, ProtocolEvent};

/// Where the relay core pushes what the application should see.
///
/// Calls are made from frame-processing tasks and must not block. An
/// implementation is free to buffer, batch or drop: nothing it does flows
/// back into routing.
pub trait DeliverySink: Send + Sync + 'static {
    /// Content addressed to this peer.
    fn on_local_delivery(&self, message: DeliveredMessage);

    /// A notification passed through (or came home to) this peer.
    fn on_notification(&self, notice: NotificationReceived);

    /// A message we originated changed status.
    fn on_status_change(&self, _change: StatusChange) {}

    /// Anything else worth observing.
    fn on_event(&self, _event: ProtocolEvent) {}
}

/// Sink backed by the bounded channels of [`RuntimeChannels`](super::RuntimeChannels).
///
/// Uses `try_send`: a full or closed channel loses the item, never stalls
/// a reader task.
pub struct ChannelSink {
    messages: mpsc::Sender<DeliveredMessage>,
    notifications: mpsc::Sender<NotificationReceived>,
    status_changes: mpsc::Sender<StatusChange>,
    events: mpsc::Sender<ProtocolEvent>,
}

impl ChannelSink {
    pub fn new(
        messages: mpsc::Sender<DeliveredMessage>,
        notifications: mpsc::Sender<NotificationReceived>,
        status_changes: mpsc::Sender<StatusChange>,
        events: mpsc::Sender<ProtocolEvent>,
    ) -> Self {
        Self {
            messages,
            notifications,
            status_changes,
            events,
        }
    }
}

impl DeliverySink for ChannelSink {
    fn on_local_delivery(&self, message: DeliveredMessage) {
        if let Err(e) = self.messages.try_send(message) {
            tracing::warn!("delivered message not passed to application: {e}");
        }
    }

    fn on_notification(&self, notice: NotificationReceived) {
        let _ = self.notifications.try_send(notice);
    }

    fn on_status_change(&self, change: StatusChange) {
        let _ = self.status_changes.try_send(change);
    }

    fn on_event(&self, event: ProtocolEvent) {
        let _ = self.events.try_send(event);
    }
}

#[cfg(test)]
pub mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps everything in memory for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<DeliveredMessage>>,
        pub notifications: Mutex<Vec<NotificationReceived>>,
        pub status_changes: Mutex<Vec<StatusChange>>,
        pub events: Mutex<Vec<ProtocolEvent>>,
    }

    impl DeliverySink for RecordingSink {
        fn on_local_delivery(&self, message: DeliveredMessage) {
            self.messages.lock().unwrap().push(message);
        }

        fn on_notification(&self, notice: NotificationReceived) {
            self.notifications.lock().unwrap().push(notice);
        }

        fn on_status_change(&self, change: StatusChange) {
            self.status_changes.lock().unwrap().push(change);
        }

        fn on_event(&self, event: ProtocolEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
