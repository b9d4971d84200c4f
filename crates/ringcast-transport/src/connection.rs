use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::encode_line;
use crate::config::RingNodeConfig;
use crate::frame::Frame;
use crate::{PeerAddress, RingTransportError};

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// The single outbound connection to the next peer of the ring.
///
/// Connects lazily, retries on a fixed interval, and tears the connection
/// down on the first write error or stalled write so the next forward
/// reconnects. There is no write queue: a frame that cannot be written is
/// lost.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct NextHopLink {
    inner: Arc<LinkState>,
}

struct LinkState {
    addr: PeerAddress,
    reconnect_interval: Duration,
    forward_wait: Duration,
    write_timeout: Duration,
    /// Current write half. Locked only for installs, writes and teardown.
    writer: Mutex<Option<Outbound>>,
    /// Serializes connection attempts so only one dial is in flight.
    connecting: Mutex<()>,
    generation: AtomicU64,
    connected: watch::Sender<bool>,
    wake: Notify,
    cancel: CancellationToken,
}

struct Outbound {
    generation: u64,
    writer: OwnedWriteHalf,
}

impl NextHopLink {
    pub fn new(
        addr: PeerAddress,
        reconnect_interval: Duration,
        forward_wait: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self::build(
            addr,
            reconnect_interval,
            forward_wait,
            DEFAULT_WRITE_TIMEOUT,
            cancel,
        )
    }

    pub fn from_config(config: &RingNodeConfig, cancel: CancellationToken) -> Self {
        Self::build(
            config.next_hop.clone(),
            config.reconnect_interval,
            config.forward_wait,
            config.write_timeout,
            cancel,
        )
    }

    fn build(
        addr: PeerAddress,
        reconnect_interval: Duration,
        forward_wait: Duration,
        write_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(LinkState {
                addr,
                reconnect_interval,
                forward_wait,
                write_timeout,
                writer: Mutex::new(None),
                connecting: Mutex::new(()),
                generation: AtomicU64::new(0),
                connected,
                wake: Notify::new(),
                cancel,
            }),
        }
    }

    /// Address of the next hop.
    pub fn addr(&self) -> &PeerAddress {
        &self.inner.addr
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Watch connection state changes (`true` = connected).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    /// Block until a connection is established, retrying every
    /// `reconnect_interval`. Only returns an error on shutdown.
    pub async fn ensure_connected(&self) -> Result<(), RingTransportError> {
        let _dialing = self.inner.connecting.lock().await;
        loop {
            if self.is_connected() {
                return Ok(());
            }
            if self.inner.cancel.is_cancelled() {
                return Err(RingTransportError::Shutdown);
            }
            match self.connect_once().await {
                Ok(()) => {
                    tracing::info!("connected to next hop {}", self.inner.addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "{e}. Retrying in {}s",
                        self.inner.reconnect_interval.as_secs_f64()
                    );
                    tokio::select! {
                        _ = self.inner.cancel.cancelled() => return Err(RingTransportError::Shutdown),
                        _ = tokio::time::sleep(self.inner.reconnect_interval) => {}
                    }
                }
            }
        }
    }

    /// One dial attempt, bounded by `reconnect_interval`. The writer lock is
    /// only taken to install the result.
    async fn connect_once(&self) -> Result<(), RingTransportError> {
        let addr = &self.inner.addr;
        let dial = TcpStream::connect((addr.host(), addr.port()));
        let stream = match tokio::time::timeout(self.inner.reconnect_interval, dial).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(RingTransportError::Connect {
                    addr: addr.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(RingTransportError::Connect {
                    addr: addr.clone(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("cannot set TCP_NODELAY towards {addr}: {e}");
        }
        let (read, writer) = stream.into_split();

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        *self.inner.writer.lock().await = Some(Outbound { generation, writer });
        self.inner.connected.send_replace(true);
        self.spawn_close_watcher(read, generation);
        Ok(())
    }

    /// Write one pre-terminated line to the current connection.
    ///
    /// A write error, or a write still blocked after `write_timeout`, closes
    /// and clears the connection and wakes the maintainer.
    pub async fn send(&self, line: &[u8]) -> Result<(), RingTransportError> {
        let mut guard = self.inner.writer.lock().await;
        let Some(outbound) = guard.as_mut() else {
            return Err(RingTransportError::NotConnected {
                addr: self.inner.addr.clone(),
            });
        };
        let write = tokio::time::timeout(self.inner.write_timeout, outbound.writer.write_all(line));
        let source = match write.await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(io::ErrorKind::TimedOut, "next hop stopped reading"),
        };
        *guard = None;
        drop(guard);
        self.inner.connected.send_replace(false);
        self.request_reconnect();
        Err(RingTransportError::Send {
            addr: self.inner.addr.clone(),
            source,
        })
    }

    /// Encode and send a frame, waiting up to `forward_wait` for a
    /// connection if none is up. Failure means the frame is dropped.
    pub async fn forward(&self, frame: &Frame) -> Result<(), RingTransportError> {
        let line = encode_line(frame)?;
        if !self.is_connected() {
            self.request_reconnect();
            self.wait_connected(self.inner.forward_wait).await;
        }
        self.send(&line).await
    }

    /// Wait until connected or `timeout` elapses. Returns the final state.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe();
        let connected = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        );
        connected
    }

    /// Wake the maintainer task so it starts dialing.
    pub fn request_reconnect(&self) {
        self.inner.wake.notify_one();
    }

    /// Drop the current connection (if it is still `generation`, when given).
    pub async fn invalidate(&self, generation: Option<u64>) {
        let mut guard = self.inner.writer.lock().await;
        let matches = match (guard.as_ref(), generation) {
            (Some(current), Some(g)) => current.generation == g,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            *guard = None;
            drop(guard);
            self.inner.connected.send_replace(false);
        }
    }

    /// Spawn the background task that owns reconnection: dial at start,
    /// then again every time a forward finds the link down.
    pub fn spawn_maintainer(&self) -> JoinHandle<()> {
        let link = self.clone();
        tokio::spawn(async move {
            loop {
                if link.ensure_connected().await.is_err() {
                    break;
                }
                tokio::select! {
                    _ = link.inner.cancel.cancelled() => break,
                    _ = link.inner.wake.notified() => {}
                }
            }
            link.invalidate(None).await;
            tracing::debug!("next hop maintainer for {} stopped", link.inner.addr);
        })
    }

    /// Detect the next hop closing its end, so the stale handle is cleared
    /// before the next write rather than by it, and start redialing.
    fn spawn_close_watcher(&self, mut read: OwnedReadHalf, generation: u64) {
        let link = self.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                tokio::select! {
                    _ = link.inner.cancel.cancelled() => return,
                    result = read.read(&mut buf) => match result {
                        Ok(0) | Err(_) => break,
                        Ok(_) => continue,
                    },
                }
            }
            tracing::info!("next hop {} closed the connection", link.inner.addr);
            link.invalidate(Some(generation)).await;
            link.request_reconnect();
        });
    }
}

impl std::fmt::Debug for NextHopLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextHopLink")
            .field("addr", &self.inner.addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}
