// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

/*!
Slave endpoint for the stampsync demo: a software clock disciplined toward a
master's timeline over UDP.

The slave never touches the host clock. It maintains a [`SoftwareClock`], a
virtual clock driven by the host's monotonic counter with a trimmable
frequency, and runs a [`SyncController`] that periodically exchanges
timestamped packets with the master, filters each round down to its
minimum-delay sample, and feeds the resulting offset to a [`PidController`].
Small offsets are slewed away through rate corrections; offsets beyond the
large-offset threshold are stepped out directly and reset the PID.

A [`SyncMonitor`] accumulates every measurement and publishes
[`SyncEvent`]s to subscribed observers, which is how front-ends (charts,
logs) stay out of the control loop.

# Example

```no_run
# async fn example() -> std::io::Result<()> {
use std::sync::Arc;
use stampsync_slave::{SoftwareClock, SyncController};

let clock = Arc::new(SoftwareClock::new());
let (controller, handle) = SyncController::builder()
    .master_addr("127.0.0.1:12345")
    .build(clock.clone())
    .await?;

tokio::spawn(controller.run());
println!("slave time: {:.6}", clock.now());
handle.stop();
# Ok(())
# }
```
*/

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod controller;
pub mod error;
pub mod filter;
pub mod monitor;
pub mod pid;
pub mod requester;

pub use clock::SoftwareClock;
pub use controller::{SyncController, SyncControllerBuilder, SyncHandle};
pub use error::{ConfigError, ExchangeError, FailureKind};
pub use filter::{Round, Sample};
pub use monitor::{
    HistoryPoint, ObserverId, PerformanceMetrics, SyncEvent, SyncMonitor, SyncObserver, SyncState,
};
pub use pid::{PidConfig, PidController};
pub use requester::Requester;
