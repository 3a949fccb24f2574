//! TCP plumbing shared by the controller and routers
//!
//! Long-lived connections get a writer task fed by a bounded queue, so a slow
//! peer never stalls the task that produces frames for it. One-shot sends
//! (forwarding hops) dial, write one frame and close.

use futures::SinkExt;
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace};

use super::framing::{FrameError, JsonFrameCodec};
use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::{RelayError, RelayResult};

/// Frames queued per connection before `try_send` starts failing
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Framed writer that encodes any serializable frame
pub fn frame_sink<W: AsyncWrite>(writer: W) -> FramedWrite<W, JsonFrameCodec<Value>> {
    FramedWrite::new(writer, JsonFrameCodec::new(DEFAULT_MAX_FRAME_SIZE))
}

/// Write one frame to a stream
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut sink = frame_sink(writer);
    sink.send(frame).await
}

/// Connect with a deadline
pub async fn dial(addr: &str, connect_timeout: Duration) -> RelayResult<TcpStream> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(RelayError::connection(format!("connect {}", addr), e)),
        Err(_) => Err(RelayError::connection(
            format!("connect {}", addr),
            format!("timed out after {:?}", connect_timeout),
        )),
    }
}

/// Open a fresh connection, write a single frame and close it
pub async fn send_once<T: Serialize>(
    addr: &str,
    frame: &T,
    connect_timeout: Duration,
) -> RelayResult<()> {
    let stream = dial(addr, connect_timeout).await?;
    let mut sink = frame_sink(stream);
    sink.send(frame).await?;
    if let Err(e) = SinkExt::<&T>::close(&mut sink).await {
        trace!(peer = %addr, error = %e, "Shutdown after one-shot send failed");
    }
    Ok(())
}

/// Handle for queueing frames onto a connection's writer task
#[derive(Debug, Clone)]
pub struct FrameSender {
    peer: SocketAddr,
    tx: mpsc::Sender<Value>,
}

impl FrameSender {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue a frame without waiting
    ///
    /// Fails if the queue is full or the writer has exited.
    pub fn send<T: Serialize>(&self, frame: &T) -> RelayResult<()> {
        let value =
            serde_json::to_value(frame).map_err(|e| FrameError::Encode(e.to_string()))?;
        self.tx.try_send(value).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                RelayError::connection(self.peer, "outbound queue full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                RelayError::connection(self.peer, "connection closed")
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Sender whose queue is read directly instead of by a writer task
    #[cfg(test)]
    pub(crate) fn detached(peer: SocketAddr) -> (Self, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        (Self { peer, tx }, rx)
    }
}

/// Spawn the writer task for one connection
///
/// The task drains the queue into a framed sink and shuts the write side
/// down once every `FrameSender` clone has been dropped.
pub fn spawn_writer(writer: OwnedWriteHalf, peer: SocketAddr) -> FrameSender {
    let (tx, mut rx) = mpsc::channel::<Value>(OUTBOUND_QUEUE_DEPTH);

    tokio::spawn(async move {
        let mut sink = frame_sink(writer);
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(peer = %peer, error = %e, "Write failed, closing writer");
                return;
            }
        }
        if let Err(e) = SinkExt::<Value>::close(&mut sink).await {
            trace!(peer = %peer, error = %e, "Writer shutdown failed");
        }
    });

    FrameSender { peer, tx }
}

/// A registered long-lived connection
///
/// Closing drops the writer queue and aborts the reader task, which releases
/// both halves of the socket.
#[derive(Debug)]
pub struct PeerLink {
    pub conn_id: u64,
    pub sender: FrameSender,
    reader: AbortHandle,
}

impl PeerLink {
    pub fn new(conn_id: u64, sender: FrameSender, reader: AbortHandle) -> Self {
        Self {
            conn_id,
            sender,
            reader,
        }
    }

    pub fn close(self) {
        self.reader.abort();
        debug!(peer = %self.sender.peer(), conn_id = self.conn_id, "Closed connection");
    }
}
