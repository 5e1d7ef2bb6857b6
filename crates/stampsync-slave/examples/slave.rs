// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Discipline a software clock against a running master and print every
//! monitor event.
//!
//! Start the master first (`cargo run --example master -p stampsync-master`),
//! then: `cargo run --example slave`

use std::sync::Arc;

use stampsync_slave::{SoftwareClock, SyncController, SyncEvent, SyncObserver};

struct PrintObserver;

impl SyncObserver for PrintObserver {
    fn notify(&self, event: &SyncEvent) {
        match event {
            SyncEvent::Sample { offset, delay, .. } => {
                println!("sample: offset={offset:+.9}s delay={delay:.9}s");
            }
            SyncEvent::StateChange { old, new } => {
                println!("state: {old} -> {new}");
            }
            SyncEvent::Error { kind, detail } => {
                println!("error: {kind}: {detail}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let clock = Arc::new(SoftwareClock::new());
    let (controller, handle) = SyncController::builder()
        .master_addr("127.0.0.1:12345")
        .build(clock.clone())
        .await?;

    handle.monitor().subscribe(Arc::new(PrintObserver));
    let task = tokio::spawn(controller.run());

    tokio::signal::ctrl_c().await?;
    handle.stop();
    let _ = task.await;

    let metrics = handle.monitor().metrics();
    println!(
        "final: {} | accuracy={:.6}s stability={:.6}s success={:.1}%",
        clock.format("%Y-%m-%d %H:%M:%S"),
        metrics.accuracy,
        metrics.stability,
        metrics.success_rate * 100.0,
    );
    Ok(())
}
