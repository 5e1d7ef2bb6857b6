// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The slave side of the four-timestamp exchange.
//!
//! A [`Requester`] owns the UDP socket and the outbound sequence counter.
//! Each [`exchange`](Requester::exchange) stamps `T1` from the software
//! clock, sends one request, and then consumes inbound datagrams until a
//! reply with the matching sequence arrives or the receive deadline passes.
//! Late replies from an earlier exchange carry a stale sequence and are
//! discarded here, never misattributed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};

use stampsync_proto::{Packet, PacketKind};

use crate::clock::SoftwareClock;
use crate::error::ExchangeError;
use crate::filter::Sample;

/// Issues timestamped requests and matches replies by sequence.
pub struct Requester {
    sock: UdpSocket,
    clock: Arc<SoftwareClock>,
    timeout: Duration,
    sequence: u16,
}

impl Requester {
    /// Bind an ephemeral local socket connected to `master` and stamp
    /// exchanges from `clock`.
    pub async fn connect(
        master: SocketAddr,
        clock: Arc<SoftwareClock>,
        timeout: Duration,
    ) -> io::Result<Self> {
        let bind_addr: SocketAddr = if master.is_ipv4() {
            "0.0.0.0:0".parse().map_err(io::Error::other)?
        } else {
            "[::]:0".parse().map_err(io::Error::other)?
        };
        let sock = UdpSocket::bind(bind_addr).await?;
        sock.connect(master).await?;
        Ok(Requester {
            sock,
            clock,
            timeout,
            sequence: 0,
        })
    }

    /// The sequence number most recently sent.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Perform one four-timestamp exchange.
    ///
    /// Returns [`ExchangeError::Timeout`] when nothing arrived before the
    /// deadline and [`ExchangeError::Mismatch`] when datagrams arrived but
    /// none matched the pending request.
    pub async fn exchange(&mut self) -> Result<Sample, ExchangeError> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;

        let t1 = self.clock.now();
        self.sock.send(&Packet::request(sequence, t1).encode()).await?;

        let deadline = Instant::now() + self.timeout;
        let mut saw_datagram = false;
        let mut buf = [0u8; 256];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.deadline_error(saw_datagram, sequence));
            }

            let len = match tokio::time::timeout(remaining, self.sock.recv(&mut buf)).await {
                Err(_elapsed) => return Err(self.deadline_error(saw_datagram, sequence)),
                Ok(Err(e)) => return Err(ExchangeError::Io(e)),
                Ok(Ok(len)) => len,
            };
            saw_datagram = true;

            let reply = match Packet::decode(&buf[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!("discarding undecodable datagram: {e}");
                    continue;
                }
            };
            if reply.kind != PacketKind::Reply || reply.sequence != sequence {
                trace!(
                    "discarding non-matching packet: kind={:?} seq={} (want {sequence})",
                    reply.kind, reply.sequence
                );
                continue;
            }

            let t4 = self.clock.now();
            return Ok(Sample::from_timestamps(t1, reply.t2, reply.t3, t4));
        }
    }

    fn deadline_error(&self, saw_datagram: bool, sequence: u16) -> ExchangeError {
        if saw_datagram {
            debug!("exchange seq={sequence}: only non-matching datagrams before deadline");
            ExchangeError::Mismatch
        } else {
            debug!("exchange seq={sequence}: no reply before deadline");
            ExchangeError::Timeout
        }
    }
}
