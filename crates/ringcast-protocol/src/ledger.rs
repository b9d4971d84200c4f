/// Who received what.
///
/// Two views over the same traffic: what this peer consumed itself, in
/// arrival order, and a per-recipient view fed both by local deliveries and
/// by the notifications that pass through this peer.
use std::collections::BTreeMap;

use ringcast_transport::PeerName;
use serde::Serialize;

/// One message as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// ID of the delivery frame.
    pub id: String,
    /// Who originated it.
    pub sender: PeerName,
    pub content: String,
    /// Unix seconds, from the frame.
    pub timestamp: i64,
}

#[derive(Debug, Default)]
pub struct DeliveryLedger {
    local: Vec<LedgerEntry>,
    by_recipient: BTreeMap<PeerName, Vec<LedgerEntry>>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message consumed by this peer.
    pub fn record_local(&mut self, local_name: &PeerName, entry: LedgerEntry) {
        self.by_recipient
            .entry(local_name.clone())
            .or_default()
            .push(entry.clone());
        self.local.push(entry);
    }

    /// Record a delivery another peer reported through a notification.
    pub fn record_reported(&mut self, recipient: PeerName, entry: LedgerEntry) {
        self.by_recipient.entry(recipient).or_default().push(entry);
    }

    /// Messages this peer consumed, oldest first.
    pub fn local(&self) -> &[LedgerEntry] {
        &self.local
    }

    /// What `recipient` is known to have received.
    pub fn received_by(&self, recipient: &PeerName) -> &[LedgerEntry] {
        self.by_recipient
            .get(recipient)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The whole per-recipient view.
    pub fn by_recipient(&self) -> &BTreeMap<PeerName, Vec<LedgerEntry>> {
        &self.by_recipient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, sender: &str) -> LedgerEntry {
        LedgerEntry {
            id: id.into(),
            sender: sender.into(),
            content: format!("content of {id}"),
            timestamp: 0,
        }
    }

    #[test]
    fn local_deliveries_keep_arrival_order() {
        let mut ledger = DeliveryLedger::new();
        let me = PeerName::from("P2");
        ledger.record_local(&me, entry("m1", "P1"));
        ledger.record_local(&me, entry("m2", "P3"));

        let ids: Vec<&str> = ledger.local().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
        assert_eq!(ledger.received_by(&me).len(), 2);
    }

    #[test]
    fn reported_deliveries_do_not_touch_local_view() {
        let mut ledger = DeliveryLedger::new();
        ledger.record_reported("P4".into(), entry("m1", "P1"));

        assert!(ledger.local().is_empty());
        assert_eq!(ledger.received_by(&"P4".into()).len(), 1);
        assert!(ledger.received_by(&"P9".into()).is_empty());
        assert_eq!(ledger.by_recipient().len(), 1);
    }
}
