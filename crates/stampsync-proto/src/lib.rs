// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

/*!
Wire protocol for the stampsync four-timestamp clock synchronization exchange.

A slave measures its clock offset against a master by exchanging a single
request/reply pair carrying three timestamps on the wire and recording a
fourth locally:

- `T1`: slave send time, stamped by the slave and echoed by the master.
- `T2`: master receive time, stamped as early as possible on receipt.
- `T3`: master send time, stamped as late as possible before the reply.
- `T4`: slave receive time, never transmitted.

All timestamps are seconds since the Unix epoch as IEEE 754 doubles in
network byte order. Packets are exactly [`PACKET_SIZE`] bytes; anything
else is rejected by [`Packet::decode`].

# Example

```rust
use stampsync_proto::{Packet, PacketKind};

let request = Packet::request(7, 1_700_000_000.25);
let bytes = request.encode();
let decoded = Packet::decode(&bytes).unwrap();
assert_eq!(decoded.kind, PacketKind::Request);
assert_eq!(decoded.sequence, 7);
```
*/

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod packet;

pub use error::DecodeError;
pub use packet::{FLAG_REPLY, FLAG_REQUEST, PACKET_SIZE, Packet, PacketKind};

/// Default UDP port for the synchronization exchange.
pub const DEFAULT_PORT: u16 = 12345;
