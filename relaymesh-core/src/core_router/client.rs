//! Application client for a local router
//!
//! Connects to a router's listen port, asks it to originate messages and
//! reads back whatever the router delivers to attached applications.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::SinkExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

use super::frames::{Delivery, RelayFrame, SendRequest};
use super::framing::{frame_stream, next_frame, FrameStream, JsonFrameCodec};
use super::transport::{dial, frame_sink};
use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::{RelayError, RelayResult};

pub struct RelayClient {
    router: SocketAddr,
    reader: FrameStream<OwnedReadHalf, RelayFrame>,
    writer: FramedWrite<OwnedWriteHalf, JsonFrameCodec<Value>>,
}

impl RelayClient {
    pub async fn connect(addr: &str, connect_timeout: Duration) -> RelayResult<Self> {
        let stream = dial(addr, connect_timeout).await?;
        let router = stream
            .peer_addr()
            .map_err(|e| RelayError::connection(format!("peer address of {}", addr), e))?;
        let (read_half, write_half) = stream.into_split();
        debug!(router = %router, "Client connected");

        Ok(Self {
            router,
            reader: frame_stream(read_half, DEFAULT_MAX_FRAME_SIZE),
            writer: frame_sink(write_half),
        })
    }

    pub fn router_addr(&self) -> SocketAddr {
        self.router
    }

    pub async fn send_message(&mut self, destination: &str, message: &str) -> RelayResult<()> {
        self.request(SendRequest::text(destination, message)).await
    }

    /// Send file contents; `message` names the file at the destination
    pub async fn send_file(
        &mut self,
        destination: &str,
        message: &str,
        contents: &[u8],
    ) -> RelayResult<()> {
        self.request(SendRequest::file(destination, message, STANDARD.encode(contents)))
            .await
    }

    async fn request(&mut self, request: SendRequest) -> RelayResult<()> {
        self.writer.send(RelayFrame::Send(request)).await?;
        Ok(())
    }

    /// Wait for the next delivery; `None` once the router closed the connection
    pub async fn receive(&mut self) -> RelayResult<Option<Delivery>> {
        loop {
            match next_frame(&mut self.reader).await {
                Ok(Some(RelayFrame::Deliver(delivery))) => return Ok(Some(delivery)),
                Ok(Some(other)) => {
                    warn!(router = %self.router, frame = ?other, "Ignoring unexpected frame");
                }
                Ok(None) => return Ok(None),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(router = %self.router, error = %e, "Dropped frame"),
            }
        }
    }

    /// Flush pending requests, then close the write side
    pub async fn close(mut self) -> RelayResult<()> {
        SinkExt::<RelayFrame>::close(&mut self.writer)
            .await
            .map_err(|e| RelayError::connection(self.router, e))
    }
}
