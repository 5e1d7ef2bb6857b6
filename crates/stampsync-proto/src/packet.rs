// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The fixed-size synchronization packet and its network-endian codec.
//!
//! ### Layout
//!
//! ```ignore
//!  0        1                 3                        11
//! +--------+--------,--------+--- ... ---+--- ... ---+--- ... ---+
//! | flags  |     sequence    |    T1     |    T2     |    T3     |
//! +--------+--------'--------+--- ... ---+--- ... ---+--- ... ---+
//!   1 byte      2 bytes         8 bytes     8 bytes     8 bytes
//! ```
//!
//! `flags` is `0x01` for a request and `0x02` for a reply; every other value
//! is invalid. The sequence correlates a reply with its request. The three
//! timestamps are IEEE 754 doubles in network byte order; `T2` and `T3` are
//! zero in requests and only meaningful in replies.

use byteorder::{BE, ByteOrder};

use crate::error::DecodeError;

/// Size of every packet on the wire, in bytes.
pub const PACKET_SIZE: usize = 27;

/// Flags byte identifying a synchronization request.
pub const FLAG_REQUEST: u8 = 0x01;

/// Flags byte identifying a synchronization reply.
pub const FLAG_REPLY: u8 = 0x02;

/// Whether a packet is a request or a reply.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PacketKind {
    /// Slave-to-master request carrying `T1`.
    Request,
    /// Master-to-slave reply carrying `T1` (echoed), `T2`, and `T3`.
    Reply,
}

impl PacketKind {
    /// The on-wire flags byte for this kind.
    pub fn flags(self) -> u8 {
        match self {
            PacketKind::Request => FLAG_REQUEST,
            PacketKind::Reply => FLAG_REPLY,
        }
    }

    /// Parse a flags byte, rejecting anything that is not a known kind.
    pub fn from_flags(flags: u8) -> Result<Self, DecodeError> {
        match flags {
            FLAG_REQUEST => Ok(PacketKind::Request),
            FLAG_REPLY => Ok(PacketKind::Reply),
            value => Err(DecodeError::BadFlags { value }),
        }
    }
}

/// A decoded synchronization packet.
///
/// The codec is stateless: [`encode`](Packet::encode) and
/// [`decode`](Packet::decode) are pure functions of the packet value and the
/// byte buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Packet {
    /// Request or reply.
    pub kind: PacketKind,
    /// Correlates a reply with its request. Wraps at 65535.
    pub sequence: u16,
    /// Slave send time (seconds).
    pub t1: f64,
    /// Master receive time (seconds). Zero in requests.
    pub t2: f64,
    /// Master send time (seconds). Zero in requests.
    pub t3: f64,
}

impl Packet {
    /// Build a request packet carrying the slave send time `t1`.
    pub fn request(sequence: u16, t1: f64) -> Self {
        Packet {
            kind: PacketKind::Request,
            sequence,
            t1,
            t2: 0.0,
            t3: 0.0,
        }
    }

    /// Build a reply packet echoing `t1` and stamping `t2`/`t3`.
    pub fn reply(sequence: u16, t1: f64, t2: f64, t3: f64) -> Self {
        Packet {
            kind: PacketKind::Reply,
            sequence,
            t1,
            t2,
            t3,
        }
    }

    /// Encode this packet into its fixed-size network representation.
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[0] = self.kind.flags();
        BE::write_u16(&mut buf[1..3], self.sequence);
        BE::write_f64(&mut buf[3..11], self.t1);
        BE::write_f64(&mut buf[11..19], self.t2);
        BE::write_f64(&mut buf[19..27], self.t3);
        buf
    }

    /// Decode a datagram.
    ///
    /// Fails when the buffer is not exactly [`PACKET_SIZE`] bytes or the
    /// flags byte is unknown. Callers are expected to drop failing
    /// datagrams and continue.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != PACKET_SIZE {
            return Err(DecodeError::BadLength { actual: buf.len() });
        }
        let kind = PacketKind::from_flags(buf[0])?;
        Ok(Packet {
            kind,
            sequence: BE::read_u16(&buf[1..3]),
            t1: BE::read_f64(&buf[3..11]),
            t2: BE::read_f64(&buf[11..19]),
            t3: BE::read_f64(&buf[19..27]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let p = Packet::request(42, 1_700_000_123.456_789);
        let decoded = Packet::decode(&p.encode()).unwrap();
        assert_eq!(decoded, p);
        assert_eq!(decoded.t2, 0.0);
        assert_eq!(decoded.t3, 0.0);
    }

    #[test]
    fn test_reply_roundtrip_bit_exact() {
        let p = Packet::reply(65535, 1.1, 2.2, 3.3);
        let decoded = Packet::decode(&p.encode()).unwrap();
        assert_eq!(decoded.t1.to_bits(), 1.1_f64.to_bits());
        assert_eq!(decoded.t2.to_bits(), 2.2_f64.to_bits());
        assert_eq!(decoded.t3.to_bits(), 3.3_f64.to_bits());
        assert_eq!(decoded.sequence, 65535);
    }

    #[test]
    fn test_wire_layout() {
        let p = Packet::reply(0x0102, 1.0, 2.0, 3.0);
        let bytes = p.encode();
        assert_eq!(bytes.len(), PACKET_SIZE);
        assert_eq!(bytes[0], FLAG_REPLY);
        assert_eq!(&bytes[1..3], &[0x01, 0x02]);
        // IEEE 754 big-endian: 1.0 = 0x3FF0000000000000.
        assert_eq!(&bytes[3..11], &1.0_f64.to_be_bytes());
        assert_eq!(&bytes[11..19], &2.0_f64.to_be_bytes());
        assert_eq!(&bytes[19..27], &3.0_f64.to_be_bytes());
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let p = Packet::request(1, 0.0);
        let bytes = p.encode();
        assert_eq!(
            Packet::decode(&bytes[..26]),
            Err(DecodeError::BadLength { actual: 26 })
        );
    }

    #[test]
    fn test_decode_rejects_long_buffer() {
        let mut long = [0u8; PACKET_SIZE + 1];
        long[0] = FLAG_REQUEST;
        assert_eq!(
            Packet::decode(&long),
            Err(DecodeError::BadLength { actual: 28 })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_flags() {
        let mut bytes = Packet::request(1, 0.0).encode();
        bytes[0] = 0x09;
        assert_eq!(
            Packet::decode(&bytes),
            Err(DecodeError::BadFlags { value: 0x09 })
        );
        bytes[0] = 0x00;
        assert_eq!(
            Packet::decode(&bytes),
            Err(DecodeError::BadFlags { value: 0x00 })
        );
        bytes[0] = 0x03;
        assert!(Packet::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_empty_buffer() {
        assert_eq!(
            Packet::decode(&[]),
            Err(DecodeError::BadLength { actual: 0 })
        );
    }

    #[test]
    fn test_kind_flags_roundtrip() {
        assert_eq!(PacketKind::from_flags(FLAG_REQUEST), Ok(PacketKind::Request));
        assert_eq!(PacketKind::from_flags(FLAG_REPLY), Ok(PacketKind::Reply));
        assert_eq!(PacketKind::Request.flags(), 0x01);
        assert_eq!(PacketKind::Reply.flags(), 0x02);
    }

    #[test]
    fn test_negative_and_subnormal_timestamps() {
        let p = Packet::reply(9, -1.5, f64::MIN_POSITIVE / 2.0, f64::MAX);
        let decoded = Packet::decode(&p.encode()).unwrap();
        assert_eq!(decoded, p);
    }
}
