// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The slave's frequency-adjustable software clock.
//!
//! The clock reads the host wall clock exactly once, at construction, to
//! pick a starting value. From then on every reading is derived from the
//! host's monotonic counter:
//!
//! ```ignore
//! now = base_time + manual_offset + elapsed_mono × (1 + rate_adjustment)
//! ```
//!
//! Rate changes fold the span accrued at the old rate into `base_time` and
//! re-anchor the monotonic snapshot, so a new rate only applies forward and
//! `now()` stays continuous. Steps ([`set_time_offset`]) are the single
//! permitted discontinuity.
//!
//! `now()` takes one short lock and never blocks on I/O, so it is safe to
//! call from any thread, including observer callbacks and render loops.
//!
//! [`set_time_offset`]: SoftwareClock::set_time_offset

use std::sync::{Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::TimeZone;

/// Default bound for the frequency trim (±100%).
pub const DEFAULT_MAX_RATE: f64 = 1.0;

#[derive(Debug)]
struct ClockState {
    /// Wall-clock seconds accrued up to `anchor` (excluding the manual offset).
    base_time: f64,
    /// Monotonic anchor paired with `base_time`.
    anchor: Instant,
    /// Frequency trim applied to monotonic time elapsed since `anchor`.
    rate_adjustment: f64,
    /// Sum of all steps applied via `set_time_offset`.
    manual_offset: f64,
}

impl ClockState {
    fn reading_at(&self, now: Instant) -> f64 {
        let elapsed = now.duration_since(self.anchor).as_secs_f64();
        self.base_time + self.manual_offset + elapsed * (1.0 + self.rate_adjustment)
    }
}

/// A monotonic-driven virtual clock with a trimmable frequency.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct SoftwareClock {
    state: Mutex<ClockState>,
    max_rate: f64,
}

impl SoftwareClock {
    /// Create a clock starting at the current host wall-clock time with the
    /// default ±100% rate bound.
    pub fn new() -> Self {
        let start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self::with_initial_time(start, DEFAULT_MAX_RATE)
    }

    /// Create a clock starting at `initial_time` seconds with a custom rate
    /// bound. `max_rate` must be non-negative; it is taken as an absolute
    /// magnitude.
    pub fn with_initial_time(initial_time: f64, max_rate: f64) -> Self {
        SoftwareClock {
            state: Mutex::new(ClockState {
                base_time: initial_time,
                anchor: Instant::now(),
                rate_adjustment: 0.0,
                manual_offset: 0.0,
            }),
            max_rate: max_rate.abs(),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current clock reading in seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        self.state().reading_at(Instant::now())
    }

    /// Trim the clock frequency. `rate` is clamped to the configured bound
    /// and applies to monotonic time from this call onward; the reading does
    /// not jump.
    pub fn set_rate_adjustment(&self, rate: f64) {
        let clamped = rate.clamp(-self.max_rate, self.max_rate);
        let now = Instant::now();
        let mut state = self.state();
        // Fold the span accrued at the old rate into the base so the new
        // rate cannot rewrite history.
        let elapsed = now.duration_since(state.anchor).as_secs_f64();
        state.base_time += elapsed * (1.0 + state.rate_adjustment);
        state.anchor = now;
        state.rate_adjustment = clamped;
    }

    /// The currently applied frequency trim.
    pub fn rate_adjustment(&self) -> f64 {
        self.state().rate_adjustment
    }

    /// The configured bound on the frequency trim.
    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    /// Step the clock by `delta` seconds.
    ///
    /// This is the only discontinuous operation; the controller that issued
    /// the step must reset its PID so a stale integral cannot fight the new
    /// regime.
    pub fn set_time_offset(&self, delta: f64) {
        self.state().manual_offset += delta;
    }

    /// Sum of all steps applied so far.
    pub fn manual_offset(&self) -> f64 {
        self.state().manual_offset
    }

    /// Current reading as integer milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        (self.now() * 1000.0) as i64
    }

    /// Format the current reading with a strftime `pattern` in local time.
    pub fn format(&self, pattern: &str) -> String {
        let now = self.now();
        let secs = now.floor() as i64;
        let nanos = ((now - now.floor()) * 1e9) as u32;
        match chrono::Local.timestamp_opt(secs, nanos) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
                dt.format(pattern).to_string()
            }
            chrono::LocalResult::None => String::new(),
        }
    }
}

impl Default for SoftwareClock {
    fn default() -> Self {
        Self::new()
    }
}
