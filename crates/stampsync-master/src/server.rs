// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! UDP responder publishing the master timeline.
//!
//! For every inbound request the responder stamps `T2` from the
//! [`TimeSource`] immediately after the datagram arrives, and `T3`
//! immediately before the reply leaves, so the interval between the two
//! stamps covers as little master-side work as possible. Everything that is
//! not a well-formed request (wrong length, unknown flags, stray replies)
//! is dropped without an answer.
//!
//! # Architecture
//!
//! The responder is a single async task servicing one socket. Runtime
//! statistics are shared through an [`Arc<ServerStats>`] handle so operator
//! front-ends can poll them without touching the serving task.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::net::UdpSocket;

use stampsync_proto::{DEFAULT_PORT, Packet, PacketKind};

use crate::time_source::TimeSource;

/// A slave counts as connected while its last request is younger than this.
const CLIENT_ACTIVITY_WINDOW: Duration = Duration::from_secs(10);

/// Builder for configuring and creating a [`MasterServer`].
pub struct MasterServerBuilder {
    listen_addr: String,
    time_source: Option<Arc<TimeSource>>,
}

impl MasterServerBuilder {
    fn new() -> Self {
        MasterServerBuilder {
            listen_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            time_source: None,
        }
    }

    /// Set the listen address (default: `0.0.0.0:12345`).
    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Use an existing time source instead of a freshly anchored one.
    ///
    /// Keep a clone of the `Arc` to drive
    /// [`set_reference_time`](TimeSource::set_reference_time) and
    /// [`adjust_reference_time`](TimeSource::adjust_reference_time) while
    /// the server runs.
    pub fn time_source(mut self, source: Arc<TimeSource>) -> Self {
        self.time_source = Some(source);
        self
    }

    /// Build the server. Binds the configured listen address.
    pub async fn build(self) -> io::Result<MasterServer> {
        let sock = UdpSocket::bind(&self.listen_addr).await?;
        info!("master responder listening on {}", self.listen_addr);
        Ok(MasterServer {
            sock,
            time_source: self.time_source.unwrap_or_else(|| Arc::new(TimeSource::new())),
            stats: Arc::new(ServerStats::new()),
        })
    }
}

/// The master UDP responder.
///
/// Created via [`MasterServer::builder()`]. Call [`run()`](MasterServer::run)
/// to start serving (typically via `tokio::spawn`).
pub struct MasterServer {
    sock: UdpSocket,
    time_source: Arc<TimeSource>,
    stats: Arc<ServerStats>,
}

impl MasterServer {
    /// Create a builder for configuring the server.
    pub fn builder() -> MasterServerBuilder {
        MasterServerBuilder::new()
    }

    /// The time source this server stamps replies from.
    pub fn time_source(&self) -> &Arc<TimeSource> {
        &self.time_source
    }

    /// Shared statistics handle; clone it before spawning
    /// [`run()`](MasterServer::run).
    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.sock.local_addr()
    }

    /// Serve requests until an I/O error occurs on the socket.
    pub async fn run(self) -> io::Result<()> {
        let mut recv_buf = [0u8; 256];

        loop {
            let (len, src_addr) = self.sock.recv_from(&mut recv_buf).await?;
            // T2 covers receipt, before any validation work.
            let t2 = self.time_source.now();

            let request = match Packet::decode(&recv_buf[..len]) {
                Ok(packet) if packet.kind == PacketKind::Request => packet,
                Ok(packet) => {
                    debug!("dropping non-request packet from {src_addr}: {:?}", packet.kind);
                    continue;
                }
                Err(e) => {
                    debug!("dropping malformed packet from {src_addr}: {e}");
                    continue;
                }
            };

            // T3 as late as possible: only encode and send remain.
            let t3 = self.time_source.now();
            let reply = Packet::reply(request.sequence, request.t1, t2, t3);
            if let Err(e) = self.sock.send_to(&reply.encode(), src_addr).await {
                warn!("failed to send reply to {src_addr}: {e}");
                continue;
            }
            self.stats.record_request();

            debug!(
                "served seq={} for {src_addr}: t1={:.6} t2={t2:.6} t3={t3:.6}",
                request.sequence, request.t1
            );
        }
    }
}

/// Runtime counters for a running [`MasterServer`].
#[derive(Debug)]
pub struct ServerStats {
    total_requests: AtomicU64,
    last_request: Mutex<Option<Instant>>,
}

impl ServerStats {
    fn new() -> Self {
        ServerStats {
            total_requests: AtomicU64::new(0),
            last_request: Mutex::new(None),
        }
    }

    fn last_request(&self) -> MutexGuard<'_, Option<Instant>> {
        match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        *self.last_request() = Some(Instant::now());
    }

    /// Take a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let last = *self.last_request();
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            client_connected: last
                .map(|at| at.elapsed() < CLIENT_ACTIVITY_WINDOW)
                .unwrap_or(false),
        }
    }
}

/// A point-in-time copy of [`ServerStats`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    /// Requests answered since the server was built.
    pub total_requests: u64,
    /// Whether a slave has requested within the activity window.
    pub client_connected: bool,
}
