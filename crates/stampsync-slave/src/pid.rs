// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! PID controller turning offset measurements into frequency corrections.
//!
//! The error fed to [`update`](PidController::update) is the measured clock
//! offset (positive when the slave is behind the master); the output is a
//! rate trim for [`SoftwareClock::set_rate_adjustment`]. Three guards keep
//! the loop well behaved:
//!
//! - the integral saturates at a configurable bound, so a long tail of
//!   one-sided errors cannot wind it up indefinitely;
//! - errors beyond the large-offset threshold zero the integral (and, when
//!   the stale integral opposed the error, restart the derivative from the
//!   new regime), so convergence after a master time jump is not fought by
//!   history;
//! - the output is clamped to the same bound the clock enforces.
//!
//! The first sample after construction or [`reset`](PidController::reset)
//! produces only the proportional term: there is no previous timestamp to
//! integrate or differentiate against.
//!
//! [`SoftwareClock::set_rate_adjustment`]: crate::clock::SoftwareClock::set_rate_adjustment

/// Gains and limits for [`PidController`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PidConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// Symmetric saturation bound on the integral term.
    pub integral_limit: f64,
    /// Symmetric clamp on the controller output.
    pub output_limit: f64,
    /// Errors beyond this magnitude zero the integral.
    pub large_offset_reset: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        PidConfig {
            kp: 0.8,
            ki: 0.5,
            kd: 0.1,
            integral_limit: 1.0,
            output_limit: 1.0,
            large_offset_reset: 1.0,
        }
    }
}

/// A PID controller over irregularly spaced samples.
#[derive(Debug)]
pub struct PidController {
    config: PidConfig,
    integral: f64,
    last_error: f64,
    last_time: Option<f64>,
}

impl PidController {
    /// Create a controller with the given gains and limits.
    pub fn new(config: PidConfig) -> Self {
        PidController {
            config,
            integral: 0.0,
            last_error: 0.0,
            last_time: None,
        }
    }

    /// Clear all accumulated state.
    ///
    /// The next [`update`](PidController::update) behaves like the first
    /// sample ever: proportional term only.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_time = None;
    }

    /// Feed an offset measurement taken at clock time `now` and return the
    /// rate correction to apply.
    pub fn update(&mut self, error: f64, now: f64) -> f64 {
        let limit = self.config.output_limit;

        let Some(last_time) = self.last_time else {
            self.last_time = Some(now);
            self.last_error = error;
            return (self.config.kp * error).clamp(-limit, limit);
        };
        let dt = now - last_time;

        if error.abs() > self.config.large_offset_reset {
            if self.integral != 0.0 && self.integral.signum() != error.signum() {
                // The stale integral pointed the wrong way; restart the
                // derivative from the new regime as well.
                self.last_error = error;
            }
            self.integral = 0.0;
        }

        let integral_limit = self.config.integral_limit;
        self.integral = (self.integral + error * dt).clamp(-integral_limit, integral_limit);

        let derivative = if dt > 0.0 {
            (error - self.last_error) / dt
        } else {
            0.0
        };

        let rate = self.config.kp * error
            + self.config.ki * self.integral
            + self.config.kd * derivative;

        self.last_error = error;
        self.last_time = Some(now);
        rate.clamp(-limit, limit)
    }

    /// The current integral term (for diagnostics).
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// The configuration this controller was built with.
    pub fn config(&self) -> &PidConfig {
        &self.config
    }
}

impl Default for PidController {
    fn default() -> Self {
        Self::new(PidConfig::default())
    }
}
