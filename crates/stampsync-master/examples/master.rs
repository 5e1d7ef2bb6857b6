// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Run a master responder on the default port and nudge its timeline.
//!
//! Run with: `cargo run --example master`

use std::sync::Arc;
use std::time::Duration;

use stampsync_master::{MasterServer, TimeSource};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let time_source = Arc::new(TimeSource::new());
    let server = MasterServer::builder()
        .listen("0.0.0.0:12345")
        .time_source(time_source.clone())
        .build()
        .await?;

    println!("master listening on {}", server.local_addr()?);
    let stats = server.stats();
    tokio::spawn(server.run());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                let snap = stats.snapshot();
                println!(
                    "{} | served {} requests | slave {}",
                    time_source.format("%Y-%m-%d %H:%M:%S"),
                    snap.total_requests,
                    if snap.client_connected { "connected" } else { "idle" },
                );
            }
        }
    }

    Ok(())
}
