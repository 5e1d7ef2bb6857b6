// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The periodic driver that disciplines the software clock.
//!
//! Each cycle the controller runs a round of back-to-back exchanges,
//! selects the minimum-delay sample, and applies its offset: offsets at or
//! beyond the large-offset threshold are stepped out directly (followed by a
//! PID reset and a zeroed rate, so the pre-step history cannot pollute the
//! new regime), everything smaller is slewed through the PID. The monitor
//! receives every sample, failure, and state transition.
//!
//! # State machine
//!
//! | State         | Trigger                                       | Next         |
//! |---------------|-----------------------------------------------|--------------|
//! | Idle          | `run()` begins                                | Syncing      |
//! | Syncing       | round, abs(offset) ≤ sync_threshold           | Synced       |
//! | Syncing       | round, offset between the thresholds          | Syncing      |
//! | Syncing       | round, abs(offset) ≥ large_offset_threshold   | LargeOffset  |
//! | Synced        | round, abs(offset) > sync_threshold           | Syncing      |
//! | LargeOffset   | step applied; next round begins               | Syncing      |
//! | any           | 3 consecutive empty rounds                    | Error        |
//! | Error         | offline window since last reply               | MasterOffline|
//! | MasterOffline | successful round                              | Syncing      |
//!
//! # Cancellation
//!
//! [`SyncHandle::stop`] flips a watch flag that the loop checks at every
//! suspension point: before each exchange, and while sleeping between
//! cycles. An in-flight receive unblocks at its deadline (at most the
//! configured `sync_timeout`), after which the task exits and the socket is
//! closed. Dropping the handle stops the controller the same way.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use stampsync_proto::DEFAULT_PORT;

use crate::clock::SoftwareClock;
use crate::error::{ConfigError, FailureKind};
use crate::filter::Round;
use crate::monitor::{DEFAULT_HISTORY_CAPACITY, SyncMonitor, SyncState};
use crate::pid::{PidConfig, PidController};
use crate::requester::Requester;

/// Empty rounds in a row before the controller reports `Error`.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Builder for configuring and creating a [`SyncController`].
pub struct SyncControllerBuilder {
    master_ip: String,
    sync_port: u16,
    master_addr_override: Option<String>,
    sync_timeout: Duration,
    sync_interval: Duration,
    rounds_per_sync: usize,
    sync_threshold: f64,
    large_offset_threshold: f64,
    master_offline_timeout: Duration,
    pid: PidConfig,
    history_capacity: usize,
}

impl SyncControllerBuilder {
    fn new() -> Self {
        SyncControllerBuilder {
            master_ip: "127.0.0.1".to_string(),
            sync_port: DEFAULT_PORT,
            master_addr_override: None,
            sync_timeout: Duration::from_secs(1),
            sync_interval: Duration::from_secs(5),
            rounds_per_sync: 6,
            sync_threshold: 0.001,
            large_offset_threshold: 5.0,
            master_offline_timeout: Duration::from_secs(15),
            pid: PidConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    /// Master IP address (default: `127.0.0.1`).
    pub fn master_ip(mut self, ip: impl Into<String>) -> Self {
        self.master_ip = ip.into();
        self
    }

    /// Master UDP port (default: 12345).
    pub fn sync_port(mut self, port: u16) -> Self {
        self.sync_port = port;
        self
    }

    /// Full `ip:port` master address, overriding
    /// [`master_ip`](Self::master_ip) and [`sync_port`](Self::sync_port).
    pub fn master_addr(mut self, addr: impl Into<String>) -> Self {
        self.master_addr_override = Some(addr.into());
        self
    }

    /// Per-exchange receive deadline (default: 1 s).
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Cycle period (default: 5 s).
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Exchanges attempted per cycle (default: 6).
    pub fn rounds_per_sync(mut self, rounds: usize) -> Self {
        self.rounds_per_sync = rounds;
        self
    }

    /// Offset magnitude considered in sync (default: 1 ms).
    pub fn sync_threshold(mut self, threshold: f64) -> Self {
        self.sync_threshold = threshold;
        self
    }

    /// Offset magnitude corrected by stepping instead of slewing
    /// (default: 5 s). The bound is inclusive: an offset exactly at the
    /// threshold steps.
    pub fn large_offset_threshold(mut self, threshold: f64) -> Self {
        self.large_offset_threshold = threshold;
        self
    }

    /// Silence after which a failing controller reports the master offline
    /// (default: 15 s).
    pub fn master_offline_timeout(mut self, timeout: Duration) -> Self {
        self.master_offline_timeout = timeout;
        self
    }

    /// PID gains (defaults: 0.8 / 0.5 / 0.1).
    pub fn pid_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.pid.kp = kp;
        self.pid.ki = ki;
        self.pid.kd = kd;
        self
    }

    /// Symmetric saturation bound on the PID integral (default: 1.0).
    pub fn pid_integral_limit(mut self, limit: f64) -> Self {
        self.pid.integral_limit = limit;
        self
    }

    /// Error magnitude that zeroes the PID integral (default: 1 s).
    pub fn pid_large_offset_reset(mut self, threshold: f64) -> Self {
        self.pid.large_offset_reset = threshold;
        self
    }

    /// Symmetric clamp on the PID's rate output (default: 1.0).
    pub fn max_rate_adjustment(mut self, limit: f64) -> Self {
        self.pid.output_limit = limit;
        self
    }

    /// Monitor history size (default: 1000 samples).
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    fn validate(&self) -> Result<SocketAddr, ConfigError> {
        if self.sync_timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                option: "sync_timeout",
            });
        }
        if self.sync_interval.is_zero() {
            return Err(ConfigError::NonPositive {
                option: "sync_interval",
            });
        }
        if self.master_offline_timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                option: "master_offline_timeout",
            });
        }
        if self.rounds_per_sync == 0 {
            return Err(ConfigError::NonPositive {
                option: "rounds_per_sync",
            });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::NonPositive {
                option: "history_capacity",
            });
        }
        if !(self.sync_threshold > 0.0) {
            return Err(ConfigError::NonPositive {
                option: "sync_threshold",
            });
        }
        if !(self.large_offset_threshold > 0.0) {
            return Err(ConfigError::NonPositive {
                option: "large_offset_threshold",
            });
        }
        if !(self.pid.integral_limit > 0.0) {
            return Err(ConfigError::NonPositive {
                option: "pid_integral_limit",
            });
        }
        if !(self.pid.output_limit > 0.0) {
            return Err(ConfigError::NonPositive {
                option: "max_rate_adjustment",
            });
        }
        if !(self.pid.large_offset_reset > 0.0) {
            return Err(ConfigError::NonPositive {
                option: "pid_large_offset_reset",
            });
        }
        for (option, gain) in [
            ("pid_kp", self.pid.kp),
            ("pid_ki", self.pid.ki),
            ("pid_kd", self.pid.kd),
        ] {
            if !(gain >= 0.0) {
                return Err(ConfigError::Negative { option });
            }
        }

        let addr = match &self.master_addr_override {
            Some(addr) => addr.clone(),
            None => format!("{}:{}", self.master_ip, self.sync_port),
        };
        addr.parse()
            .map_err(|_| ConfigError::InvalidAddr { addr })
    }

    /// Build the controller. Binds the exchange socket.
    ///
    /// Returns the controller (to be spawned via
    /// `tokio::spawn(controller.run())`) and a [`SyncHandle`] for stopping
    /// it and reading the monitor.
    pub async fn build(
        self,
        clock: Arc<SoftwareClock>,
    ) -> io::Result<(SyncController, SyncHandle)> {
        let master = self.validate()?;
        let requester = Requester::connect(master, clock.clone(), self.sync_timeout).await?;
        let monitor = Arc::new(SyncMonitor::new(self.history_capacity, self.sync_threshold));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok((
            SyncController {
                clock,
                monitor: monitor.clone(),
                pid: PidController::new(self.pid),
                requester,
                shutdown: shutdown_rx,
                sync_interval: self.sync_interval,
                rounds_per_sync: self.rounds_per_sync,
                sync_threshold: self.sync_threshold,
                large_offset_threshold: self.large_offset_threshold,
                master_offline_timeout: self.master_offline_timeout,
                last_reply: None,
                started: Instant::now(),
            },
            SyncHandle {
                shutdown: shutdown_tx,
                monitor,
            },
        ))
    }
}

/// Handle for a running [`SyncController`].
///
/// Dropping the handle also stops the controller.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    monitor: Arc<SyncMonitor>,
}

impl SyncHandle {
    /// Request the controller to stop at its next suspension point.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// The monitor fed by this controller.
    pub fn monitor(&self) -> Arc<SyncMonitor> {
        self.monitor.clone()
    }
}

/// Periodic synchronization driver.
///
/// Created via [`SyncController::builder()`].
pub struct SyncController {
    clock: Arc<SoftwareClock>,
    monitor: Arc<SyncMonitor>,
    pid: PidController,
    requester: Requester,
    shutdown: watch::Receiver<bool>,
    sync_interval: Duration,
    rounds_per_sync: usize,
    sync_threshold: f64,
    large_offset_threshold: f64,
    master_offline_timeout: Duration,
    /// Monotonic twin of the monitor's last-sync bookkeeping, kept here
    /// because the offline window is elapsed real time, not clock time.
    last_reply: Option<Instant>,
    started: Instant,
}

impl SyncController {
    /// Create a builder for configuring the controller.
    pub fn builder() -> SyncControllerBuilder {
        SyncControllerBuilder::new()
    }

    /// The monitor fed by this controller.
    pub fn monitor(&self) -> Arc<SyncMonitor> {
        self.monitor.clone()
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Run the synchronization loop until stopped.
    ///
    /// Cycle N completes, PID update and monitor notification included,
    /// before cycle N+1 begins.
    pub async fn run(mut self) {
        info!("sync controller starting");
        self.started = Instant::now();
        self.monitor.set_state(SyncState::Syncing);

        loop {
            self.run_cycle().await;
            if self.stop_requested() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.sync_interval) => {}
                // stop() only ever sends `true`; a closed channel means the
                // handle is gone and nobody can stop us later.
                _ = self.shutdown.changed() => break,
            }
        }
        info!("sync controller stopped");
    }

    /// Run one cycle: a round of exchanges, selection, and correction.
    async fn run_cycle(&mut self) {
        // The step for the previous large offset has been applied; the next
        // round runs as a fresh convergence attempt.
        if self.monitor.state() == SyncState::LargeOffset {
            self.monitor.set_state(SyncState::Syncing);
        }

        let mut round = Round::new(self.rounds_per_sync);
        for attempt in 1..=self.rounds_per_sync {
            if self.stop_requested() {
                return;
            }
            match self.requester.exchange().await {
                Ok(sample) => {
                    self.last_reply = Some(Instant::now());
                    trace!(
                        "exchange {attempt}/{}: offset={:.9} delay={:.9}",
                        self.rounds_per_sync, sample.offset, sample.delay
                    );
                    round.record(sample);
                }
                Err(e) => {
                    debug!("exchange {attempt}/{} failed: {e}", self.rounds_per_sync);
                    self.monitor.report_failure(
                        e.kind(),
                        format!("exchange {attempt}/{}: {e}", self.rounds_per_sync),
                    );
                }
            }
        }

        let Some(best) = round.best_sample().copied() else {
            self.cycle_failed();
            return;
        };

        // Re-entry from a failure state is via Syncing, whatever this
        // round's offset classifies as afterwards.
        let state = self.monitor.state();
        if state == SyncState::Error || state == SyncState::MasterOffline {
            self.monitor.set_state(SyncState::Syncing);
        }

        let offset = best.offset;
        if offset.abs() >= self.large_offset_threshold {
            info!("offset {offset:+.3}s beyond step threshold: stepping clock");
            self.monitor.set_state(SyncState::LargeOffset);
            self.clock.set_time_offset(offset);
            self.pid.reset();
            self.clock.set_rate_adjustment(0.0);
        } else {
            let rate = self.pid.update(offset, self.clock.now());
            self.clock.set_rate_adjustment(rate);
            let next = if offset.abs() <= self.sync_threshold {
                SyncState::Synced
            } else {
                SyncState::Syncing
            };
            self.monitor.set_state(next);
            debug!(
                "cycle complete: offset={offset:.9} delay={:.9} rate={rate:.9}",
                best.delay
            );
        }

        self.monitor.record_sample(self.clock.now(), offset, best.delay);
    }

    /// Bookkeeping for a round in which every exchange failed.
    ///
    /// The consecutive-failure count lives in the monitor so front-ends can
    /// read it next to the state; a successful cycle resets it when its
    /// sample is recorded.
    fn cycle_failed(&mut self) {
        let failures = self.monitor.record_cycle_failure();
        warn!("round empty ({failures} consecutive failed cycles)");
        self.monitor.report_failure(
            FailureKind::RoundEmpty,
            format!("all {} exchanges failed", self.rounds_per_sync),
        );

        // MasterOffline is the stronger classification; it is not demoted
        // back to Error by further empty rounds.
        let state = self.monitor.state();
        if failures >= MAX_CONSECUTIVE_FAILURES
            && state != SyncState::Error
            && state != SyncState::MasterOffline
        {
            self.monitor.set_state(SyncState::Error);
        }
        let silent_for = match self.last_reply {
            Some(at) => at.elapsed(),
            None => self.started.elapsed(),
        };
        if self.monitor.state() == SyncState::Error && silent_for >= self.master_offline_timeout {
            self.monitor.set_state(SyncState::MasterOffline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_invalid(builder: SyncControllerBuilder, option: &str) {
        let err = builder.validate().unwrap_err();
        assert!(
            err.to_string().contains(option),
            "expected error naming {option}, got: {err}"
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let addr = SyncController::builder().validate().unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_zero_interval_rejected() {
        expect_invalid(
            SyncController::builder().sync_interval(Duration::ZERO),
            "sync_interval",
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        expect_invalid(
            SyncController::builder().sync_timeout(Duration::ZERO),
            "sync_timeout",
        );
    }

    #[test]
    fn test_zero_rounds_rejected() {
        expect_invalid(
            SyncController::builder().rounds_per_sync(0),
            "rounds_per_sync",
        );
    }

    #[test]
    fn test_non_positive_thresholds_rejected() {
        expect_invalid(
            SyncController::builder().sync_threshold(0.0),
            "sync_threshold",
        );
        expect_invalid(
            SyncController::builder().large_offset_threshold(-5.0),
            "large_offset_threshold",
        );
        expect_invalid(
            SyncController::builder().sync_threshold(f64::NAN),
            "sync_threshold",
        );
    }

    #[test]
    fn test_negative_gain_rejected() {
        expect_invalid(
            SyncController::builder().pid_gains(0.8, -0.5, 0.1),
            "pid_ki",
        );
    }

    #[test]
    fn test_bad_address_rejected() {
        expect_invalid(
            SyncController::builder().master_ip("not-an-ip"),
            "invalid master address",
        );
        expect_invalid(
            SyncController::builder().master_addr("127.0.0.1"), // port missing
            "invalid master address",
        );
    }

    #[test]
    fn test_master_addr_overrides_ip_and_port() {
        let addr = SyncController::builder()
            .master_ip("10.0.0.1")
            .sync_port(9)
            .master_addr("192.168.1.5:4321")
            .validate()
            .unwrap();
        assert_eq!(addr.to_string(), "192.168.1.5:4321");
    }
}
