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

//! Reference sensor server.
//!
//! Speaks the same protocol as the production sensor sources and can be
//! told to misbehave in the ways real ones do: never answer the handshake,
//! corrupt checksums, go silent mid-stream, or refuse the token. Used by the
//! integration tests and the `mock_sensor` demo.

use crate::protocol::{encode_frame, Handshake, Measurement, Record, SourceKind};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How the server treats each accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    Normal,
    /// Accept, then never read or answer
    HangConnect,
    /// Valid frames with the checksum off by one
    BadChecksum,
    /// Handshake normally, then stop answering polls
    HangData,
    /// Reply to the handshake with something other than the ack
    RejectHandshake,
}

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub kind: SourceKind,
    pub mode: MockMode,
    /// Pause after each frame
    pub interval: Duration,
    /// Wait for a poll request before each frame; otherwise stream freely
    pub expect_poll: bool,
    pub handshake: Handshake,
}

impl MockOptions {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            mode: MockMode::Normal,
            interval: Duration::from_millis(100),
            expect_poll: true,
            handshake: Handshake::default(),
        }
    }

    pub fn mode(mut self, mode: MockMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.expect_poll = false;
        self
    }
}

/// Sample values the reference server emits
pub fn sample_record(kind: SourceKind) -> Record {
    let timestamp_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default();
    let measurement = match kind {
        SourceKind::TemperaturePressure => Measurement::TemperaturePressure {
            temperature: 25.5,
            pressure: 100,
        },
        SourceKind::Triaxial => Measurement::Triaxial {
            x: 10,
            y: 20,
            z: 30,
        },
    };
    Record::new(timestamp_us, measurement)
}

/// A running mock sensor server; dropping it stops it
pub struct MockSensorServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    connections: Arc<AtomicUsize>,
    frames_sent: Arc<AtomicU64>,
}

impl MockSensorServer {
    /// Start on an ephemeral localhost port
    pub async fn start(options: MockOptions) -> io::Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), options).await
    }

    /// Start on a fixed address, e.g. to come back on the port of a server that was shut down
    pub async fn bind(addr: SocketAddr, options: MockOptions) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let connections = Arc::new(AtomicUsize::new(0));
        let frames_sent = Arc::new(AtomicU64::new(0));

        debug!("Mock sensor on {} ({:?}, {})", addr, options.mode, options.kind);

        let task = tokio::spawn(accept_loop(
            listener,
            options,
            cancel.clone(),
            connections.clone(),
            frames_sent.clone(),
        ));

        Ok(Self {
            addr,
            cancel,
            task: Some(task),
            connections,
            frames_sent,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }

    /// Stop listening and close every open connection
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockSensorServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    options: MockOptions,
    cancel: CancellationToken,
    connections: Arc<AtomicUsize>,
    frames_sent: Arc<AtomicU64>,
) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    debug!("Mock sensor accepted {}", peer);
                    connections.fetch_add(1, Ordering::SeqCst);
                    let options = options.clone();
                    let cancel = cancel.clone();
                    let frames_sent = frames_sent.clone();
                    handlers.spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            served = serve(socket, &options, &frames_sent) => {
                                if let Err(e) = served {
                                    debug!("Mock connection from {} ended: {}", peer, e);
                                }
                            }
                        }
                    });
                }
                Err(e) => warn!("Mock sensor accept failed: {}", e),
            },
        }
    }

    drop(listener);
    while handlers.join_next().await.is_some() {}
}

async fn serve(
    mut socket: TcpStream,
    options: &MockOptions,
    frames_sent: &AtomicU64,
) -> io::Result<()> {
    if options.mode == MockMode::HangConnect {
        std::future::pending::<()>().await;
    }

    let mut buf = vec![0u8; 1024];
    let n = socket.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }

    if options.mode == MockMode::RejectHandshake {
        socket.write_all(b"denied!").await?;
        return Ok(());
    }
    if options.handshake.accepts_token(&buf[..n]) {
        socket.write_all(options.handshake.ack()).await?;
    }

    loop {
        if options.expect_poll {
            let n = socket.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
        }

        if options.mode == MockMode::HangData {
            std::future::pending::<()>().await;
        }

        let mut frame = encode_frame(&sample_record(options.kind)).to_vec();
        if options.mode == MockMode::BadChecksum {
            let last = frame.len() - 1;
            frame[last] = frame[last].wrapping_add(1);
        }
        socket.write_all(&frame).await?;
        frames_sent.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(options.interval).await;
    }
}
