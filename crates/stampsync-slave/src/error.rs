// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Error types for the slave endpoint.
//!
//! Failures are local wherever possible: a bad datagram is dropped, a failed
//! exchange is recorded, a failed round only moves the state machine. The
//! one fatal class is [`ConfigError`]: an out-of-range knob rejects
//! construction instead of being silently clamped. Every runtime failure is
//! also surfaced to monitor observers as a [`FailureKind`]-tagged event.

use std::fmt;
use std::io;

/// Why a single timestamp exchange failed.
#[derive(Debug)]
pub enum ExchangeError {
    /// No datagram arrived before the receive deadline.
    Timeout,
    /// Datagrams arrived, but none matched the pending request before the
    /// deadline (wrong flags, wrong sequence, or undecodable).
    Mismatch,
    /// Socket-level failure.
    Io(io::Error),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::Timeout => write!(f, "no reply within the receive deadline"),
            ExchangeError::Mismatch => {
                write!(f, "no matching reply within the receive deadline")
            }
            ExchangeError::Io(e) => write!(f, "exchange I/O error: {e}"),
        }
    }
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExchangeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExchangeError {
    fn from(err: io::Error) -> ExchangeError {
        ExchangeError::Io(err)
    }
}

impl ExchangeError {
    /// The monitor-event tag for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            ExchangeError::Timeout => FailureKind::Timeout,
            ExchangeError::Mismatch => FailureKind::Mismatch,
            ExchangeError::Io(_) => FailureKind::Io,
        }
    }
}

/// Classification of runtime failures reported through monitor events.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FailureKind {
    /// An exchange saw no datagram at all.
    Timeout,
    /// An exchange saw only non-matching datagrams.
    Mismatch,
    /// Every exchange of a round failed.
    RoundEmpty,
    /// A socket operation failed.
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Mismatch => write!(f, "sequence mismatch"),
            FailureKind::RoundEmpty => write!(f, "round empty"),
            FailureKind::Io => write!(f, "io"),
        }
    }
}

/// An out-of-range configuration knob, rejected at construction.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// An option that must be strictly positive was zero or negative.
    NonPositive {
        /// Name of the offending option.
        option: &'static str,
    },
    /// An option that must be non-negative was negative.
    Negative {
        /// Name of the offending option.
        option: &'static str,
    },
    /// The master address did not parse as `ip:port`.
    InvalidAddr {
        /// The address string that failed to parse.
        addr: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositive { option } => {
                write!(f, "{option} must be strictly positive")
            }
            ConfigError::Negative { option } => {
                write!(f, "{option} must not be negative")
            }
            ConfigError::InvalidAddr { addr } => {
                write!(f, "invalid master address: {addr}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for io::Error {
    fn from(err: ConfigError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidInput, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_display() {
        assert_eq!(
            ExchangeError::Timeout.to_string(),
            "no reply within the receive deadline"
        );
        assert_eq!(
            ExchangeError::Mismatch.to_string(),
            "no matching reply within the receive deadline"
        );
    }

    #[test]
    fn test_exchange_error_kinds() {
        assert_eq!(ExchangeError::Timeout.kind(), FailureKind::Timeout);
        assert_eq!(ExchangeError::Mismatch.kind(), FailureKind::Mismatch);
        let io_err = ExchangeError::from(io::Error::other("boom"));
        assert_eq!(io_err.kind(), FailureKind::Io);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::RoundEmpty.to_string(), "round empty");
        assert_eq!(FailureKind::Mismatch.to_string(), "sequence mismatch");
    }

    #[test]
    fn test_config_error_into_io_error() {
        let err = ConfigError::NonPositive {
            option: "sync_interval",
        };
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
        assert!(io_err.to_string().contains("sync_interval"));
    }
}
