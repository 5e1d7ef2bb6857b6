// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Master endpoint for the stampsync demo: a settable reference timeline and
//! the UDP responder that publishes it.
//!
//! The master never adjusts anything. It owns a [`TimeSource`], a reference
//! timeline driven by the host's monotonic clock, and answers each slave
//! request with the receive (`T2`) and send (`T3`) stamps taken from that
//! source. Operators can rebase the timeline to an arbitrary wall-clock
//! string or nudge it by a signed number of seconds while the responder keeps
//! serving.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use std::sync::Arc;
//! use stampsync_master::{MasterServer, TimeSource};
//!
//! let time_source = Arc::new(TimeSource::new());
//! let server = MasterServer::builder()
//!     .listen("0.0.0.0:12345")
//!     .time_source(time_source.clone())
//!     .build()
//!     .await?;
//!
//! tokio::spawn(server.run());
//! time_source.adjust_reference_time(0.2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod server;
pub mod time_source;

pub use server::{MasterServer, MasterServerBuilder, ServerStats, StatsSnapshot};
pub use time_source::TimeSource;
