// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Error types for wire packet decoding.
//!
//! [`DecodeError`] carries enough detail to log why a datagram was dropped.
//! Both endpoints treat every decode failure the same way: drop the datagram
//! silently and keep serving. A conversion into [`std::io::Error`] is
//! provided for call sites that bubble errors through `io::Result`.

use std::fmt;
use std::io;

/// Errors that can occur while decoding a synchronization packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The datagram is not exactly the fixed packet size.
    BadLength {
        /// Number of bytes received.
        actual: usize,
    },
    /// The flags byte is neither a request nor a reply.
    BadFlags {
        /// The flags byte that was received.
        value: u8,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadLength { actual } => {
                write!(
                    f,
                    "packet length must be {} bytes, got {}",
                    crate::PACKET_SIZE,
                    actual
                )
            }
            DecodeError::BadFlags { value } => {
                write!(f, "unknown packet flags: 0x{value:02X}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for io::Error {
    fn from(err: DecodeError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_length_display() {
        let e = DecodeError::BadLength { actual: 12 };
        assert_eq!(e.to_string(), "packet length must be 27 bytes, got 12");
    }

    #[test]
    fn test_bad_flags_display() {
        let e = DecodeError::BadFlags { value: 0x09 };
        assert_eq!(e.to_string(), "unknown packet flags: 0x09");
    }

    #[test]
    fn test_into_io_error_kind() {
        let io_err: io::Error = DecodeError::BadFlags { value: 0xFF }.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        let inner = io_err
            .get_ref()
            .unwrap()
            .downcast_ref::<DecodeError>()
            .unwrap();
        assert_eq!(*inner, DecodeError::BadFlags { value: 0xFF });
    }
}
