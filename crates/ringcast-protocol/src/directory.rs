/// Peers learned from notification traffic.
///
/// Display only: routing never consults the directory, it always goes to
/// the next hop.
use std::collections::HashMap;
use std::time::Instant;

use ringcast_transport::{PeerAddress, PeerName};

/// Last-known address of a ring peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: PeerName,
    pub address: PeerAddress,
    pub last_seen: Instant,
}

#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerName, PeerRecord>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a peer. Returns `true` when the peer is new or its
    /// address changed.
    pub fn upsert(&mut self, name: PeerName, address: PeerAddress) -> bool {
        let now = Instant::now();
        match self.peers.get_mut(&name) {
            Some(record) => {
                record.last_seen = now;
                if record.address == address {
                    return false;
                }
                record.address = address;
                true
            }
            None => {
                self.peers.insert(
                    name.clone(),
                    PeerRecord {
                        name,
                        address,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, name: &PeerName) -> Option<&PeerRecord> {
        self.peers.get(name)
    }

    /// All known peers, sorted by name.
    pub fn peers(&self) -> Vec<PeerRecord> {
        let mut peers: Vec<PeerRecord> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.name.cmp(&b.name));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_and_moved_peers() {
        let mut dir = PeerDirectory::new();
        assert!(dir.upsert("P2".into(), PeerAddress::new("10.0.0.2", 9651)));
        assert!(!dir.upsert("P2".into(), PeerAddress::new("10.0.0.2", 9651)));
        assert!(dir.upsert("P2".into(), PeerAddress::new("10.0.0.9", 9651)));

        assert_eq!(dir.len(), 1);
        assert_eq!(
            dir.get(&"P2".into()).unwrap().address,
            PeerAddress::new("10.0.0.9", 9651)
        );
    }

    #[test]
    fn peers_sorted_by_name() {
        let mut dir = PeerDirectory::new();
        dir.upsert("P4".into(), PeerAddress::new("h", 4));
        dir.upsert("P2".into(), PeerAddress::new("h", 2));
        dir.upsert("P3".into(), PeerAddress::new("h", 3));

        let names: Vec<String> = dir.peers().iter().map(|p| p.name.to_string()).collect();
        assert_eq!(names, ["P2", "P3", "P4"]);
    }
}
