// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! One TCP session with one sensor source.
//!
//! A [`Link`] lives for exactly one connection attempt: connect, handshake,
//! then read frames until something goes wrong or the collector stops.
//! It never retries on its own; the supervisor decides what happens next
//! based on the returned [`LinkOutcome`].

use crate::config::{Endpoint, LinkSettings};
use crate::error::WriteError;
use crate::protocol::{self, FrameError};
use crate::storage::RecordSink;
use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phase of an endpoint slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Idle,
    Connecting,
    Handshaking,
    Streaming,
    Faulted,
    Backoff,
    Stopped,
}

/// Why a link ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Connection refused, unreachable or unresolvable
    ConnectFailed(String),
    /// Connect or acknowledgement did not complete in time
    HandshakeTimeout,
    /// Peer answered the handshake with something other than the ack
    HandshakeRejected,
    /// Peer closed, reset, or went idle past the watchdog
    Disconnected(String),
    /// Collector shutdown
    Cancelled,
}

impl fmt::Display for LinkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkOutcome::ConnectFailed(reason) => write!(f, "connect failed: {}", reason),
            LinkOutcome::HandshakeTimeout => f.write_str("handshake timed out"),
            LinkOutcome::HandshakeRejected => f.write_str("handshake rejected"),
            LinkOutcome::Disconnected(reason) => write!(f, "disconnected: {}", reason),
            LinkOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Counters for one endpoint slot, shared across its successive links
#[derive(Debug, Default)]
pub struct LinkStats {
    sessions: AtomicU64,
    records: AtomicU64,
    rejected_frames: AtomicU64,
    faults: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatsSnapshot {
    /// Handshakes that reached streaming
    pub sessions: u64,
    pub records: u64,
    pub rejected_frames: u64,
    pub faults: u64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            sessions: self.sessions.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }
}

/// A single connection attempt to one endpoint
pub struct Link {
    endpoint: Endpoint,
    settings: LinkSettings,
    sink: Arc<dyn RecordSink>,
    stats: Arc<LinkStats>,
}

impl Link {
    pub fn new(
        endpoint: Endpoint,
        settings: LinkSettings,
        sink: Arc<dyn RecordSink>,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            endpoint,
            settings,
            sink,
            stats,
        }
    }

    /// Drive the connection until it ends
    ///
    /// Phases are published into `state` as they are entered. The only error
    /// is a storage failure; every network fault becomes a [`LinkOutcome`].
    pub async fn run(
        &self,
        state: &watch::Sender<LinkState>,
        cancel: &CancellationToken,
    ) -> Result<LinkOutcome, WriteError> {
        state.send_replace(LinkState::Connecting);
        debug!(endpoint = %self.endpoint.name, "Connecting to {}", self.endpoint.address());

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Ok(LinkOutcome::Cancelled),
            connected = self.connect() => match connected {
                Ok(stream) => stream,
                Err(outcome) => return Ok(outcome),
            },
        };

        state.send_replace(LinkState::Handshaking);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(LinkOutcome::Cancelled),
            handshake = self.handshake(&mut stream) => {
                if let Err(outcome) = handshake {
                    return Ok(outcome);
                }
            }
        }

        info!(endpoint = %self.endpoint.name, "Handshake accepted, streaming");
        self.stats.sessions.fetch_add(1, Ordering::Relaxed);
        state.send_replace(LinkState::Streaming);

        self.stream(&mut stream, cancel).await
    }

    async fn connect(&self) -> Result<TcpStream, LinkOutcome> {
        let address = (self.endpoint.host.as_str(), self.endpoint.port);
        match timeout(self.settings.connect_timeout(), TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(endpoint = %self.endpoint.name, "Could not set TCP_NODELAY: {}", e);
                }
                Ok(stream)
            }
            Ok(Err(e)) => Err(LinkOutcome::ConnectFailed(e.to_string())),
            Err(_) => Err(LinkOutcome::HandshakeTimeout),
        }
    }

    async fn handshake<S>(&self, stream: &mut S) -> Result<(), LinkOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let handshake = self.settings.handshake();
        let ack_len = handshake.ack_len();
        // Filled outside the timed future so a partial reply survives the timeout
        let mut reply = Vec::with_capacity(ack_len);
        let exchange = async {
            stream.write_all(&handshake.encode()).await?;
            let mut chunk = vec![0u8; ack_len];
            while reply.len() < ack_len {
                let n = stream.read(&mut chunk[..ack_len - reply.len()]).await?;
                if n == 0 {
                    break;
                }
                reply.extend_from_slice(&chunk[..n]);
            }
            Ok::<_, io::Error>(())
        };
        let exchanged = timeout(self.settings.handshake_timeout(), exchange).await;

        match exchanged {
            Ok(Err(e)) => Err(LinkOutcome::Disconnected(e.to_string())),
            _ if handshake.decode_ack(&reply) => Ok(()),
            Ok(Ok(())) if reply.is_empty() => Err(LinkOutcome::Disconnected(
                "peer closed during handshake".to_string(),
            )),
            Err(_) if reply.is_empty() => Err(LinkOutcome::HandshakeTimeout),
            _ => {
                warn!(
                    endpoint = %self.endpoint.name,
                    "Unexpected handshake reply: {:?}",
                    String::from_utf8_lossy(&reply)
                );
                Err(LinkOutcome::HandshakeRejected)
            }
        }
    }

    /// Read loop. Records from this connection reach the sink in arrival order.
    async fn stream<S>(
        &self,
        stream: &mut S,
        cancel: &CancellationToken,
    ) -> Result<LinkOutcome, WriteError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let kind = self.endpoint.kind;
        let poll = self.settings.poll_request();
        let mut frame = vec![0u8; kind.frame_len()];

        loop {
            if cancel.is_cancelled() {
                return Ok(LinkOutcome::Cancelled);
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(LinkOutcome::Cancelled),
                read = self.next_frame(stream, poll.as_deref(), &mut frame) => read,
            };
            if let Err(e) = read {
                return Ok(LinkOutcome::Disconnected(e.to_string()));
            }

            match protocol::decode_frame(&frame, kind) {
                Ok(record) => {
                    self.sink.append(&self.endpoint.name, &record).await?;
                    self.stats.records.fetch_add(1, Ordering::Relaxed);
                }
                Err(e @ FrameError::ChecksumMismatch { .. }) => {
                    warn!(endpoint = %self.endpoint.name, "Dropping frame: {}", e);
                    self.stats.rejected_frames.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint.name, "Dropping malformed frame: {}", e);
                    self.stats.rejected_frames.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Poll (if configured) and fill `frame` completely, accumulating short reads.
    async fn next_frame<S>(
        &self,
        stream: &mut S,
        poll: Option<&[u8]>,
        frame: &mut [u8],
    ) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let exchange = async {
            if let Some(request) = poll {
                stream.write_all(request).await?;
            }
            stream.read_exact(frame).await.map(|_| ())
        };

        match self.settings.idle_timeout() {
            Some(idle) => timeout(idle, exchange).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no frame within {:?}", idle),
                )
            })?,
            None => exchange.await,
        }
    }
}
