//! Synthetic tick batches, one per second boundary.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use super::server::FanoutServer;
use crate::models::Tick;
use crate::wire;

/// Symbol universe: S0001..=S1000.
pub const UNIVERSE: usize = 1000;

/// Draw one second's batch: 100..=300 distinct symbols, two ticks each
/// around `1.17 + (i % 100) * 1e-4`, fairly shuffled.
pub fn build_batch<R: Rng + ?Sized>(rng: &mut R, ts: i64) -> Vec<Tick> {
    let k = rng.gen_range(100..=300);
    let picked = rand::seq::index::sample(rng, UNIVERSE, k);
    let mut batch = Vec::with_capacity(k * 2);
    for i in picked {
        let symbol = format!("S{:04}", i + 1);
        let base = 1.17000 + (i % 100) as f64 * 0.00010;
        for _ in 0..2 {
            let close = base + rng.gen_range(-3.0e-4..=3.0e-4);
            let high = close + rng.gen_range(-3.0e-4..=3.0e-4f64).abs();
            let low = close - rng.gen_range(-3.0e-4..=3.0e-4f64).abs();
            batch.push(Tick {
                symbol: symbol.clone(),
                open: base,
                high,
                low,
                close,
                volume: rng.gen_range(1000..=5000),
                ts,
            });
        }
    }
    batch.shuffle(rng);
    batch
}

/// Run the generator on a dedicated named thread.
pub fn spawn(server: Arc<FanoutServer>, secret: String) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("tick-generator".to_string())
        .spawn(move || run(server, secret))
        .context("failed to spawn generator thread")
}

fn run(server: Arc<FanoutServer>, secret: String) {
    let mut rng = rand::thread_rng();
    let mut batches: u64 = 0;
    while server.is_running() {
        let ts = Utc::now().timestamp();
        let batch = build_batch(&mut rng, ts);
        for tick in &batch {
            let frame = wire::sign_frame(&secret, &tick.to_wire_json());
            server.broadcast(&frame);
        }
        batches += 1;
        debug!(ts, frames = batch.len(), sessions = server.session_count(), "batch broadcast");
        if batches % 60 == 0 {
            let stats = server.stats().snapshot();
            info!(
                batches,
                sessions = server.session_count(),
                frames_broadcast = stats.frames_broadcast,
                frames_dropped = stats.frames_dropped,
                "generator heartbeat"
            );
        }
        sleep_to_next_second();
    }
    info!("generator stopped");
}

fn sleep_to_next_second() {
    let subsec = Utc::now().timestamp_subsec_nanos() as u64;
    // Floor of 1ms so landing exactly on a boundary cannot spin.
    let remaining = 1_000_000_000u64.saturating_sub(subsec).max(1_000_000);
    thread::sleep(Duration::from_nanos(remaining));
}
