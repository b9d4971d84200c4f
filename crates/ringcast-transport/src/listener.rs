use std::net::SocketAddr;
use std::sync::Arc;

use futures_lite::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::codec::decode_line;
use crate::frame::Frame;
use crate::{PeerAddress, RingTransportError};

/// Consumer of decoded inbound frames.
///
/// Called once per frame, in receipt order for a given connection, from
/// that connection's own task. Different connections call concurrently.
#[async_trait::async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    async fn handle_frame(&self, from: SocketAddr, frame: Frame);
}

const ACCEPT_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

/// Accepts inbound connections from any ring peer.
pub struct InboundListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_frame_size: usize,
}

impl InboundListener {
    /// Bind the listening socket. Failure here is fatal for the peer.
    pub async fn bind(addr: &PeerAddress, max_frame_size: usize) -> Result<Self, RingTransportError> {
        let listener = TcpListener::bind((addr.host(), addr.port()))
            .await
            .map_err(|source| RingTransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| RingTransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
        tracing::info!("listening for incoming connections on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            max_frame_size,
        })
    }

    /// The actual bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop until `cancel` fires. Each connection gets its
    /// own reader task.
    pub fn spawn<H: FrameHandler>(self, handler: Arc<H>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let (stream, remote) = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = self.listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            // e.g. EMFILE: retrying at once would spin.
                            tracing::error!("failed to accept connection: {e}");
                            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                            continue;
                        }
                    },
                };
                tracing::info!("accepted connection from {remote}");
                tokio::spawn(serve_connection(
                    stream,
                    remote,
                    self.max_frame_size,
                    handler.clone(),
                    cancel.clone(),
                ));
            }
            tracing::debug!("listener on {} stopped", self.local_addr);
        })
    }
}

/// Reader loop for one inbound connection.
///
/// A line that is not a valid frame is logged and skipped; only a read
/// error, a framing error or EOF ends the loop.
async fn serve_connection<H: FrameHandler>(
    stream: TcpStream,
    remote: SocketAddr,
    max_frame_size: usize,
    handler: Arc<H>,
    cancel: CancellationToken,
) {
    let mut lines = FramedRead::new(stream, LinesCodec::new_with_max_length(max_frame_size));
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = lines.next() => next,
        };
        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::error!("error reading from {remote}: {e}");
                break;
            }
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_line(line.as_bytes()) {
            Ok(frame) => handler.handle_frame(remote, frame).await,
            Err(e) => tracing::warn!("bad frame from {remote}: {e}"),
        }
    }
    tracing::debug!("connection from {remote} closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_line;
    use crate::frame::DeliveryFrame;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    struct ChannelHandler(mpsc::Sender<(SocketAddr, Frame)>);

    #[async_trait::async_trait]
    impl FrameHandler for ChannelHandler {
        async fn handle_frame(&self, from: SocketAddr, frame: Frame) {
            let _ = self.0.send((from, frame)).await;
        }
    }

    async fn spawn_listener(
        max_frame_size: usize,
    ) -> (SocketAddr, mpsc::Receiver<(SocketAddr, Frame)>, CancellationToken) {
        let listener = InboundListener::bind(&"127.0.0.1:0".parse().unwrap(), max_frame_size)
            .await
            .unwrap();
        let addr = listener.local_addr();
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        listener.spawn(Arc::new(ChannelHandler(tx)), cancel.clone());
        (addr, rx, cancel)
    }

    fn line(id: &str) -> Vec<u8> {
        encode_line(&Frame::Delivery(DeliveryFrame::new(
            id,
            "a".into(),
            None,
            vec!["b".into()],
            "c",
            10,
        )))
        .unwrap()
    }

    async fn recv(rx: &mut mpsc::Receiver<(SocketAddr, Frame)>) -> Frame {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame should arrive")
            .unwrap()
            .1
    }

    #[tokio::test]
    async fn bad_line_does_not_close_connection() {
        let (addr, mut rx, cancel) = spawn_listener(1024).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"{ definitely not json\n").await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        stream.write_all(&line("after-garbage")).await.unwrap();

        assert_eq!(recv(&mut rx).await.id(), "after-garbage");
        cancel.cancel();
    }

    #[tokio::test]
    async fn frames_keep_receipt_order_per_connection() {
        let (addr, mut rx, cancel) = spawn_listener(1024).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut batch = Vec::new();
        for i in 0..5 {
            batch.extend(line(&format!("f-{i}")));
        }
        stream.write_all(&batch).await.unwrap();

        for i in 0..5 {
            assert_eq!(recv(&mut rx).await.id(), format!("f-{i}"));
        }
        cancel.cancel();
    }

    #[tokio::test]
    async fn serves_connections_concurrently() {
        let (addr, mut rx, cancel) = spawn_listener(1024).await;
        let mut idle = TcpStream::connect(addr).await.unwrap();
        idle.write_all(b"{\"id\":").await.unwrap(); // partial line, never finished

        let mut active = TcpStream::connect(addr).await.unwrap();
        active.write_all(&line("second-conn")).await.unwrap();

        assert_eq!(recv(&mut rx).await.id(), "second-conn");
        cancel.cancel();
    }

    #[tokio::test]
    async fn oversized_line_closes_only_that_connection() {
        let (addr, mut rx, cancel) = spawn_listener(128).await;

        let mut big = TcpStream::connect(addr).await.unwrap();
        big.write_all(&[b'x'; 300]).await.unwrap();
        big.write_all(b"\n").await.unwrap();

        let mut other = TcpStream::connect(addr).await.unwrap();
        let small = b"{\"id\":\"s\",\"sender\":\"a\",\"recipients\":[\"b\"],\"content\":\"c\",\"max_hops\":3}\n";
        other.write_all(small).await.unwrap();

        assert_eq!(recv(&mut rx).await.id(), "s");
        cancel.cancel();
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = InboundListener::bind(&"127.0.0.1:0".parse().unwrap(), 1024)
            .await
            .unwrap();
        let taken: PeerAddress = first.local_addr().into();
        let err = InboundListener::bind(&taken, 1024).await.err().unwrap();
        assert!(matches!(err, RingTransportError::Bind { .. }));
    }
}
