// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The master's reference timeline.
//!
//! [`TimeSource`] anchors a wall-clock epoch to a monotonic counter at
//! construction and derives every subsequent reading from the counter alone,
//! so host wall-clock jumps (NTP steps, manual changes) never leak into the
//! published timeline. Two independent controls exist on top of the anchor:
//!
//! - [`set_reference_time`](TimeSource::set_reference_time) rebases the
//!   timeline to an operator-supplied `YYYY-MM-DD HH:MM:SS` local time and
//!   clears any accumulated offset.
//! - [`adjust_reference_time`](TimeSource::adjust_reference_time) accumulates
//!   a signed offset without touching the anchor, for fine nudges.
//!
//! Every read is one short critical section, so responder stamps taken while
//! an operator command lands observe either the old or the new timeline,
//! never a mix.

use std::sync::{Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{Local, NaiveDateTime, TimeZone};
use log::info;

/// Format accepted by [`TimeSource::set_reference_time`].
const REFERENCE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
struct TimeSourceState {
    /// Wall-clock seconds at the anchor instant.
    base_time: f64,
    /// Monotonic anchor paired with `base_time`.
    anchor: Instant,
    /// Accumulated adjustment from `adjust_reference_time`.
    time_offset: f64,
    /// Whether an operator has rebased the timeline.
    custom_time_set: bool,
}

/// A monotonic-driven reference timeline with a settable epoch.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct TimeSource {
    state: Mutex<TimeSourceState>,
}

impl TimeSource {
    /// Create a time source anchored to the current host wall clock.
    ///
    /// This is the only point at which the host wall clock is read.
    pub fn new() -> Self {
        let base_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        TimeSource {
            state: Mutex::new(TimeSourceState {
                base_time,
                anchor: Instant::now(),
                time_offset: 0.0,
                custom_time_set: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimeSourceState> {
        // State stays consistent even if a holder panicked: every mutation
        // is a plain field store.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current reference time in seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        let state = self.state();
        state.base_time + state.anchor.elapsed().as_secs_f64() + state.time_offset
    }

    /// Rebase the timeline to `time_string` (`YYYY-MM-DD HH:MM:SS`, local
    /// time), clearing the accumulated offset.
    ///
    /// Returns `false` without touching any state when the string does not
    /// parse or does not name a valid local time.
    pub fn set_reference_time(&self, time_string: &str) -> bool {
        let Ok(naive) = NaiveDateTime::parse_from_str(time_string, REFERENCE_TIME_FORMAT) else {
            return false;
        };
        let Some(local) = Local.from_local_datetime(&naive).earliest() else {
            return false;
        };
        let epoch_seconds = local.timestamp() as f64;

        let mut state = self.state();
        state.base_time = epoch_seconds;
        state.anchor = Instant::now();
        state.time_offset = 0.0;
        state.custom_time_set = true;
        drop(state);

        info!("reference time set to {time_string}");
        true
    }

    /// Shift the timeline by `delta` seconds and return the new reading.
    pub fn adjust_reference_time(&self, delta: f64) -> f64 {
        let mut state = self.state();
        state.time_offset += delta;
        let now = state.base_time + state.anchor.elapsed().as_secs_f64() + state.time_offset;
        drop(state);

        info!("reference time adjusted by {delta:+.3}s");
        now
    }

    /// Whether [`set_reference_time`](TimeSource::set_reference_time) has
    /// succeeded at least once.
    pub fn custom_time_set(&self) -> bool {
        self.state().custom_time_set
    }

    /// Format the current reading with a strftime `pattern` in local time.
    pub fn format(&self, pattern: &str) -> String {
        format_timestamp(self.now(), pattern)
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Render `seconds` since the Unix epoch with a strftime `pattern` in the
/// local timezone. Falls back to an empty string for unrepresentable values.
fn format_timestamp(seconds: f64, pattern: &str) -> String {
    let secs = seconds.floor() as i64;
    let nanos = ((seconds - seconds.floor()) * 1e9) as u32;
    match Local.timestamp_opt(secs, nanos) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.format(pattern).to_string()
        }
        chrono::LocalResult::None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_advances_monotonically() {
        let source = TimeSource::new();
        let a = source.now();
        std::thread::sleep(Duration::from_millis(5));
        let b = source.now();
        assert!(b > a, "time went backwards: {a} -> {b}");
    }

    #[test]
    fn test_adjust_shifts_and_returns_new_reading() {
        let source = TimeSource::new();
        let before = source.now();
        let adjusted = source.adjust_reference_time(10.0);
        assert!(adjusted - before >= 10.0);
        assert!(adjusted - before < 10.5);
    }

    #[test]
    fn test_adjust_roundtrip_cancels() {
        let source = TimeSource::new();
        let before = source.now();
        source.adjust_reference_time(123.5);
        source.adjust_reference_time(-123.5);
        let after = source.now();
        // Equal modulo the monotonic time that elapsed in between.
        assert!(after >= before);
        assert!(after - before < 0.5);
    }

    #[test]
    fn test_set_reference_time_rebases() {
        let source = TimeSource::new();
        source.adjust_reference_time(500.0);
        assert!(source.set_reference_time("2024-03-01 12:00:00"));
        assert!(source.custom_time_set());
        // The offset was cleared along with the rebase.
        let expected = Local
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .unwrap()
            .timestamp() as f64;
        let now = source.now();
        assert!(now >= expected);
        assert!(now - expected < 1.0);
    }

    #[test]
    fn test_set_reference_time_rejects_garbage() {
        let source = TimeSource::new();
        let before = source.now();
        assert!(!source.set_reference_time("not a time"));
        assert!(!source.set_reference_time("2024-13-01 12:00:00"));
        assert!(!source.set_reference_time("2024-03-01T12:00:00"));
        assert!(!source.custom_time_set());
        // No state change on failure.
        let after = source.now();
        assert!(after - before < 0.5);
    }

    #[test]
    fn test_format_round_trips_reference_string() {
        let source = TimeSource::new();
        assert!(source.set_reference_time("2024-03-01 12:00:00"));
        let formatted = source.format("%Y-%m-%d %H:%M:%S");
        assert!(formatted.starts_with("2024-03-01 12:00:0"), "{formatted}");
    }

    #[test]
    fn test_default_matches_new() {
        let source = TimeSource::default();
        assert!(!source.custom_time_set());
    }
}
