use std::time::Duration;

use crate::PeerAddress;

/// Configuration for a [`RingNode`](crate::RingNode).
///
/// Both addresses are required; everything else has a default:
///
/// ```rust
/// use std::time::Duration;
/// use ringcast_transport::RingNodeConfig;
///
/// let config = RingNodeConfig::new("0.0.0.0:9651".parse().unwrap(), "10.0.0.2:9651".parse().unwrap())
///     .reconnect_interval(Duration::from_secs(2))
///     .max_frame_size(64 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct RingNodeConfig {
    /// Address the inbound listener binds.
    pub(crate) listen: PeerAddress,
    /// Address other peers should use to reach us. Defaults to `listen`.
    pub(crate) advertised: Option<PeerAddress>,
    /// The next peer of the ring.
    pub(crate) next_hop: PeerAddress,
    /// Fixed delay between failed connection attempts.
    pub(crate) reconnect_interval: Duration,
    /// How long a forward waits for a missing connection before dropping.
    pub(crate) forward_wait: Duration,
    /// Longest a single write may take before the connection is dropped.
    pub(crate) write_timeout: Duration,
    /// Longest accepted inbound line, in bytes.
    pub(crate) max_frame_size: usize,
}

impl RingNodeConfig {
    pub fn new(listen: PeerAddress, next_hop: PeerAddress) -> Self {
        Self {
            listen,
            advertised: None,
            next_hop,
            reconnect_interval: Duration::from_secs(5),
            forward_wait: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
            max_frame_size: 1024 * 1024, // 1 MB
        }
    }

    /// Advertise a different address than the one bound (e.g. behind NAT).
    pub fn advertised(mut self, addr: PeerAddress) -> Self {
        self.advertised = Some(addr);
        self
    }

    /// Set the reconnect backoff (default: 5 s).
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set how long a forward may wait for a connection (default: 1 s).
    pub fn forward_wait(mut self, wait: Duration) -> Self {
        self.forward_wait = wait;
        self
    }

    /// Set how long one write may block on a next hop that stopped
    /// reading (default: 5 s).
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the maximum inbound line length (default: 1 MB).
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub fn listen_addr(&self) -> &PeerAddress {
        &self.listen
    }

    pub fn next_hop(&self) -> &PeerAddress {
        &self.next_hop
    }
}
