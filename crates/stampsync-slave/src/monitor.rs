// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Synchronization health tracking and observer dispatch.
//!
//! The [`SyncMonitor`] is the read side of the slave: the controller pushes
//! every measurement and state transition into it, and front-ends either
//! subscribe a [`SyncObserver`] for push notifications or poll the
//! snapshots: [`history`](SyncMonitor::history),
//! [`metrics`](SyncMonitor::metrics),
//! [`consecutive_failures`](SyncMonitor::consecutive_failures), and
//! [`last_sync_time`](SyncMonitor::last_sync_time). The monitor holds no
//! reference back to the controller, which keeps the object graph acyclic.
//!
//! Observers are invoked synchronously from the controller's task after the
//! internal lock is released; they receive borrowed events and must not
//! block.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::FailureKind;

/// Default number of history points retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// The slave's synchronization state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SyncState {
    /// Controller not started yet.
    Idle,
    /// Actively converging toward the master.
    Syncing,
    /// Offset within the sync threshold.
    Synced,
    /// Offset beyond the step threshold; a step has been applied.
    LargeOffset,
    /// Three consecutive rounds produced no sample.
    Error,
    /// No reply from the master for the offline window.
    MasterOffline,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::LargeOffset => write!(f, "large offset"),
            SyncState::Error => write!(f, "error"),
            SyncState::MasterOffline => write!(f, "master offline"),
        }
    }
}

/// An event pushed to subscribed observers.
#[derive(Clone, Debug)]
pub enum SyncEvent {
    /// A round produced a best sample.
    Sample {
        /// Slave clock time when the sample was recorded.
        time: f64,
        /// The best sample's offset (seconds).
        offset: f64,
        /// The best sample's delay (seconds).
        delay: f64,
    },
    /// The synchronization state changed.
    StateChange {
        /// State before the transition.
        old: SyncState,
        /// State after the transition.
        new: SyncState,
    },
    /// A runtime failure occurred.
    Error {
        /// Failure classification.
        kind: FailureKind,
        /// Human-readable detail.
        detail: String,
    },
}

/// Receives [`SyncEvent`]s synchronously from the controller's task.
///
/// Implementations must not block: they run inline in the control loop.
pub trait SyncObserver: Send + Sync {
    /// Handle one event.
    fn notify(&self, event: &SyncEvent);
}

/// Token returned by [`SyncMonitor::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ObserverId(u64);

/// One retained measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryPoint {
    /// Slave clock time when the sample was recorded.
    pub time: f64,
    /// Best-sample offset (seconds).
    pub offset: f64,
    /// Best-sample delay (seconds).
    pub delay: f64,
}

/// Aggregate quality figures derived from the retained history.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceMetrics {
    /// Magnitude of the most recent offset (seconds).
    pub accuracy: f64,
    /// Sample standard deviation of retained offsets (seconds).
    pub stability: f64,
    /// Largest offset magnitude in the retained history (seconds).
    pub precision: f64,
    /// Mean retained delay (seconds).
    pub avg_delay: f64,
    /// Fraction of recorded rounds whose offset was within the sync
    /// threshold, in `[0, 1]`.
    pub success_rate: f64,
    /// Number of rounds recorded since construction.
    pub rounds_recorded: u64,
}

struct MonitorInner {
    history: VecDeque<HistoryPoint>,
    capacity: usize,
    state: SyncState,
    observers: Vec<(u64, Arc<dyn SyncObserver>)>,
    next_observer_id: u64,
    rounds_recorded: u64,
    rounds_in_threshold: u64,
    consecutive_failures: u32,
    last_sync_time: Option<f64>,
}

/// Bounded history of measurements plus the current state machine value.
pub struct SyncMonitor {
    inner: Mutex<MonitorInner>,
    sync_threshold: f64,
}

impl SyncMonitor {
    /// Create a monitor retaining up to `capacity` history points and
    /// judging success against `sync_threshold` (seconds).
    pub fn new(capacity: usize, sync_threshold: f64) -> Self {
        SyncMonitor {
            inner: Mutex::new(MonitorInner {
                history: VecDeque::with_capacity(capacity),
                capacity,
                state: SyncState::Idle,
                observers: Vec::new(),
                next_observer_id: 0,
                rounds_recorded: 0,
                rounds_in_threshold: 0,
                consecutive_failures: 0,
                last_sync_time: None,
            }),
            sync_threshold,
        }
    }

    fn inner(&self) -> MutexGuard<'_, MonitorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register an observer; returns a token for [`unsubscribe`].
    ///
    /// [`unsubscribe`]: SyncMonitor::unsubscribe
    pub fn subscribe(&self, observer: Arc<dyn SyncObserver>) -> ObserverId {
        let mut inner = self.inner();
        let id = inner.next_observer_id;
        inner.next_observer_id += 1;
        inner.observers.push((id, observer));
        ObserverId(id)
    }

    /// Remove a previously registered observer. Returns whether it was
    /// still registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut inner = self.inner();
        let before = inner.observers.len();
        inner.observers.retain(|(oid, _)| *oid != id.0);
        inner.observers.len() != before
    }

    /// The current synchronization state.
    pub fn state(&self) -> SyncState {
        self.inner().state
    }

    /// A copy of the retained history, oldest first.
    pub fn history(&self) -> Vec<HistoryPoint> {
        self.inner().history.iter().copied().collect()
    }

    /// The most recent history point, if any round has completed.
    pub fn last_sample(&self) -> Option<HistoryPoint> {
        self.inner().history.back().copied()
    }

    /// Empty rounds since the last successful cycle.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner().consecutive_failures
    }

    /// Slave clock time of the last successful cycle, if any.
    pub fn last_sync_time(&self) -> Option<f64> {
        self.inner().last_sync_time
    }

    /// Derive aggregate quality figures from the retained history.
    pub fn metrics(&self) -> PerformanceMetrics {
        let inner = self.inner();
        let mut metrics = PerformanceMetrics {
            rounds_recorded: inner.rounds_recorded,
            ..PerformanceMetrics::default()
        };
        if inner.rounds_recorded > 0 {
            metrics.success_rate =
                inner.rounds_in_threshold as f64 / inner.rounds_recorded as f64;
        }
        let n = inner.history.len();
        if n == 0 {
            return metrics;
        }

        let offsets: Vec<f64> = inner.history.iter().map(|p| p.offset).collect();
        metrics.accuracy = offsets[n - 1].abs();
        metrics.precision = offsets.iter().fold(0.0_f64, |m, o| m.max(o.abs()));
        metrics.avg_delay = inner.history.iter().map(|p| p.delay).sum::<f64>() / n as f64;
        if n >= 2 {
            let mean = offsets.iter().sum::<f64>() / n as f64;
            let var = offsets.iter().map(|o| (o - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            metrics.stability = var.sqrt();
        }
        metrics
    }

    /// Record a completed round and notify observers.
    pub(crate) fn record_sample(&self, time: f64, offset: f64, delay: f64) {
        let observers;
        {
            let mut inner = self.inner();
            while !inner.history.is_empty() && inner.history.len() >= inner.capacity {
                inner.history.pop_front();
            }
            inner.history.push_back(HistoryPoint { time, offset, delay });
            inner.rounds_recorded += 1;
            if offset.abs() < self.sync_threshold {
                inner.rounds_in_threshold += 1;
            }
            inner.consecutive_failures = 0;
            inner.last_sync_time = Some(time);
            observers = inner.observers.clone();
        }
        dispatch(&observers, &SyncEvent::Sample { time, offset, delay });
    }

    /// Move to `new` if different, notifying observers of the transition.
    /// Returns the previous state.
    pub(crate) fn set_state(&self, new: SyncState) -> SyncState {
        let observers;
        let old;
        {
            let mut inner = self.inner();
            old = inner.state;
            if old == new {
                return old;
            }
            inner.state = new;
            observers = inner.observers.clone();
        }
        dispatch(&observers, &SyncEvent::StateChange { old, new });
        old
    }

    /// Report a runtime failure to observers.
    pub(crate) fn report_failure(&self, kind: FailureKind, detail: String) {
        let observers = self.inner().observers.clone();
        dispatch(&observers, &SyncEvent::Error { kind, detail });
    }

    /// Count one empty round; returns the updated consecutive total.
    pub(crate) fn record_cycle_failure(&self) -> u32 {
        let mut inner = self.inner();
        inner.consecutive_failures += 1;
        inner.consecutive_failures
    }
}

/// Invoke observers outside the monitor lock so a callback may read the
/// monitor back without deadlocking.
fn dispatch(observers: &[(u64, Arc<dyn SyncObserver>)], event: &SyncEvent) {
    for (_, observer) in observers {
        observer.notify(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver {
        samples: AtomicUsize,
        state_changes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl CountingObserver {
        fn new() -> Arc<Self> {
            Arc::new(CountingObserver {
                samples: AtomicUsize::new(0),
                state_changes: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
            })
        }
    }

    impl SyncObserver for CountingObserver {
        fn notify(&self, event: &SyncEvent) {
            match event {
                SyncEvent::Sample { .. } => self.samples.fetch_add(1, Ordering::SeqCst),
                SyncEvent::StateChange { .. } => self.state_changes.fetch_add(1, Ordering::SeqCst),
                SyncEvent::Error { .. } => self.errors.fetch_add(1, Ordering::SeqCst),
            };
        }
    }

    #[test]
    fn test_starts_idle_and_empty() {
        let monitor = SyncMonitor::new(10, 0.001);
        assert_eq!(monitor.state(), SyncState::Idle);
        assert!(monitor.history().is_empty());
        assert!(monitor.last_sample().is_none());
        assert_eq!(monitor.consecutive_failures(), 0);
        assert!(monitor.last_sync_time().is_none());
        assert_eq!(monitor.metrics(), PerformanceMetrics::default());
    }

    #[test]
    fn test_failure_counter_resets_on_success() {
        let monitor = SyncMonitor::new(10, 0.001);
        assert_eq!(monitor.record_cycle_failure(), 1);
        assert_eq!(monitor.record_cycle_failure(), 2);
        assert_eq!(monitor.consecutive_failures(), 2);

        monitor.record_sample(42.0, 0.0, 0.0);
        assert_eq!(monitor.consecutive_failures(), 0);
        assert_eq!(monitor.record_cycle_failure(), 1);
    }

    #[test]
    fn test_last_sync_time_tracks_successful_cycles() {
        let monitor = SyncMonitor::new(10, 0.001);
        monitor.record_sample(5.0, 0.01, 0.002);
        assert_eq!(monitor.last_sync_time(), Some(5.0));

        // Failures do not touch it.
        monitor.record_cycle_failure();
        assert_eq!(monitor.last_sync_time(), Some(5.0));

        monitor.record_sample(10.0, 0.0, 0.0);
        assert_eq!(monitor.last_sync_time(), Some(10.0));
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let monitor = SyncMonitor::new(3, 0.001);
        for i in 0..5 {
            monitor.record_sample(i as f64, i as f64 * 0.01, 0.001);
        }
        let history = monitor.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].time, 2.0);
        assert_eq!(history[2].time, 4.0);
        assert_eq!(monitor.last_sample().unwrap().time, 4.0);
    }

    #[test]
    fn test_observer_receives_all_event_kinds() {
        let monitor = SyncMonitor::new(10, 0.001);
        let observer = CountingObserver::new();
        monitor.subscribe(observer.clone());

        monitor.record_sample(1.0, 0.0005, 0.001);
        monitor.set_state(SyncState::Syncing);
        monitor.set_state(SyncState::Syncing); // no-op, no event
        monitor.report_failure(FailureKind::Timeout, "exchange 3".into());

        assert_eq!(observer.samples.load(Ordering::SeqCst), 1);
        assert_eq!(observer.state_changes.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let monitor = SyncMonitor::new(10, 0.001);
        let observer = CountingObserver::new();
        let id = monitor.subscribe(observer.clone());
        assert!(monitor.unsubscribe(id));
        assert!(!monitor.unsubscribe(id));

        monitor.record_sample(1.0, 0.0, 0.0);
        assert_eq!(observer.samples.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_state_returns_previous() {
        let monitor = SyncMonitor::new(10, 0.001);
        assert_eq!(monitor.set_state(SyncState::Syncing), SyncState::Idle);
        assert_eq!(monitor.set_state(SyncState::Synced), SyncState::Syncing);
        assert_eq!(monitor.state(), SyncState::Synced);
    }

    #[test]
    fn test_metrics_over_known_history() {
        let monitor = SyncMonitor::new(10, 0.001);
        monitor.record_sample(1.0, 0.0004, 0.010); // within threshold
        monitor.record_sample(2.0, -0.0200, 0.030);
        monitor.record_sample(3.0, 0.0100, 0.020);

        let metrics = monitor.metrics();
        assert_eq!(metrics.rounds_recorded, 3);
        assert!((metrics.accuracy - 0.0100).abs() < 1e-12);
        assert!((metrics.precision - 0.0200).abs() < 1e-12);
        assert!((metrics.avg_delay - 0.020).abs() < 1e-12);
        assert!((metrics.success_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!(metrics.stability > 0.0);
    }

    #[test]
    fn test_observer_may_read_monitor_reentrantly() {
        struct ReentrantObserver {
            monitor: std::sync::Weak<SyncMonitor>,
            seen: AtomicUsize,
        }
        impl SyncObserver for ReentrantObserver {
            fn notify(&self, _event: &SyncEvent) {
                if let Some(monitor) = self.monitor.upgrade() {
                    let _ = monitor.history();
                    let _ = monitor.state();
                    self.seen.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let monitor = Arc::new(SyncMonitor::new(10, 0.001));
        let observer = Arc::new(ReentrantObserver {
            monitor: Arc::downgrade(&monitor),
            seen: AtomicUsize::new(0),
        });
        monitor.subscribe(observer.clone());
        monitor.record_sample(1.0, 0.0, 0.0);
        assert_eq!(observer.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SyncState::Idle.to_string(), "idle");
        assert_eq!(SyncState::MasterOffline.to_string(), "master offline");
        assert_eq!(SyncState::LargeOffset.to_string(), "large offset");
    }
}
