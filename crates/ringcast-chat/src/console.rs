//! Text rendering for the console.
//!
//! Everything here returns strings so main can decide where they go.

use chrono::{DateTime, Local};
use ringcast_protocol::{
    DeliveredMessage, LedgerEntry, NotificationReceived, PeerRecord, ProtocolEvent, TrackedStatus,
};

/// `HH:MM:SS` in local time for a Unix-seconds timestamp.
pub fn clock(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(t) => t.with_timezone(&Local).format("%H:%M:%S").to_string(),
        None => Local::now().format("%H:%M:%S").to_string(),
    }
}

pub fn delivered_line(msg: &DeliveredMessage) -> String {
    format!(
        "[{}] Received message from {}: {}",
        clock(msg.timestamp),
        msg.from,
        msg.content
    )
}

/// Only receipts for our own messages are shown; the rest is relay traffic.
pub fn notification_line(notice: &NotificationReceived) -> Option<String> {
    notice.addressed_to_us.then(|| {
        format!(
            "[{}] {} received your message: {}",
            clock(notice.timestamp),
            notice.recipient,
            notice.content
        )
    })
}

pub fn event_line(event: &ProtocolEvent) -> Option<String> {
    match event {
        ProtocolEvent::NextHopConnected { addr } => Some(format!("Connected to next hop {addr}")),
        ProtocolEvent::NextHopDisconnected { addr } => {
            Some(format!("Lost next hop {addr}, reconnecting..."))
        }
        _ => None,
    }
}

pub fn ledger(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No messages received yet.".to_string();
    }
    entries
        .iter()
        .map(|e| format!("[{}] {}: {}", clock(e.timestamp), e.sender, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn peers(records: &[PeerRecord]) -> String {
    if records.is_empty() {
        return "No peers seen yet.".to_string();
    }
    records
        .iter()
        .map(|p| {
            format!(
                "{:<16} {:<24} seen {}s ago",
                p.name.as_str(),
                p.address.to_string(),
                p.last_seen.elapsed().as_secs()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn status(message_id: &str, tracked: Option<&TrackedStatus>) -> String {
    let Some(tracked) = tracked else {
        return format!("No sent message with id {message_id}");
    };
    let list = |names: &[ringcast_protocol::PeerName]| {
        if names.is_empty() {
            "-".to_string()
        } else {
            names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
        }
    };
    format!(
        "{message_id}: {} (received by: {}; waiting for: {})",
        tracked.status,
        list(&tracked.confirmed),
        list(&tracked.awaiting)
    )
}
