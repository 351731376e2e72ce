//! Per-symbol second-bar aggregation.
//!
//! The fold itself is a pure state machine so it tests without sockets; a
//! dedicated consumer thread drives it off the ingress ring and hands each
//! closed bar to the store and the push channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use super::store::BarStore;
use super::GatewayStats;
use crate::models::{Bar, Tick};
use crate::ring::Ring;

#[derive(Default)]
pub struct AggregatorStats {
    pub ticks_consumed: AtomicU64,
    pub bars_closed: AtomicU64,
}

impl AggregatorStats {
    pub fn snapshot(&self) -> AggregatorStatsSnapshot {
        AggregatorStatsSnapshot {
            ticks_consumed: self.ticks_consumed.load(Ordering::Relaxed),
            bars_closed: self.bars_closed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregatorStatsSnapshot {
    pub ticks_consumed: u64,
    pub bars_closed: u64,
}

/// One accumulation window: at most one in-progress bar per symbol, all
/// sharing `last_sec` as their timestamp.
#[derive(Default)]
pub struct AggState {
    bars: HashMap<String, Bar>,
    last_sec: i64,
}

impl AggState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one tick; returns the bars it closed (empty within a window).
    ///
    /// Any change of `ts`, forward or backward, flushes every open bar.
    /// The very first tick cannot flush (`last_sec` starts at 0). No
    /// wall-clock timeout exists: a stalled feed leaves bars open.
    pub fn apply(&mut self, tick: &Tick) -> Vec<Bar> {
        let mut closed = Vec::new();
        if self.last_sec != 0 && tick.ts != self.last_sec {
            closed.extend(self.bars.drain().map(|(_, bar)| bar));
        }
        match self.bars.get_mut(&tick.symbol) {
            Some(bar) => bar.update(tick),
            None => {
                self.bars.insert(tick.symbol.clone(), Bar::open_from(tick));
            }
        }
        self.last_sec = tick.ts;
        closed
    }

    pub fn open_bars(&self) -> usize {
        self.bars.len()
    }

    pub fn last_sec(&self) -> i64 {
        self.last_sec
    }
}

/// Consumer thread: pop the ingress ring, fold, persist and broadcast each
/// closed bar. The only blocking call is a 1 ms sleep on an empty ring.
pub fn spawn_consumer(
    ring: Arc<Ring<Tick>>,
    store: Arc<BarStore>,
    bar_tx: broadcast::Sender<Bar>,
    stats: Arc<GatewayStats>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("bar-aggregator".to_string())
        .spawn(move || {
            info!("aggregation consumer running");
            let mut state = AggState::new();
            loop {
                match ring.pop() {
                    Some(tick) => {
                        stats.aggregator.ticks_consumed.fetch_add(1, Ordering::Relaxed);
                        for bar in state.apply(&tick) {
                            store.insert(&bar);
                            // No receivers yet is not an error.
                            let _ = bar_tx.send(bar);
                            stats.aggregator.bars_closed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    None => thread::sleep(Duration::from_millis(1)),
                }
            }
        })
        .context("failed to spawn aggregator thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, ts: i64, high: f64, low: f64, close: f64, volume: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            open: 1.0,
            high,
            low,
            close,
            volume,
            ts,
        }
    }

    #[test]
    fn same_second_ticks_fold_into_one_bar() {
        let mut state = AggState::new();
        assert!(state.apply(&tick("S0001", 1000, 1.1, 1.0, 1.05, 10)).is_empty());
        assert!(state.apply(&tick("S0001", 1000, 1.2, 0.9, 1.10, 20)).is_empty());

        let closed = state.apply(&tick("S0002", 1001, 1.0, 1.0, 1.0, 1));
        assert_eq!(closed.len(), 1);
        let bar = &closed[0];
        assert_eq!(bar.symbol, "S0001");
        assert_eq!(bar.ts, 1000);
        assert_eq!(bar.open, 1.05);
        assert_eq!(bar.high, 1.2);
        assert_eq!(bar.low, 0.9);
        assert_eq!(bar.close, 1.10);
        assert_eq!(bar.volume, 30);
    }

    #[test]
    fn timestamp_advance_flushes_every_symbol() {
        let mut state = AggState::new();
        state.apply(&tick("S0001", 1000, 1.1, 1.0, 1.05, 10));
        state.apply(&tick("S0002", 1000, 2.1, 2.0, 2.05, 20));

        let mut closed = state.apply(&tick("S0001", 1001, 1.0, 1.0, 1.0, 1));
        closed.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|b| b.ts == 1000));
        assert_eq!(closed[0].symbol, "S0001");
        assert_eq!(closed[1].symbol, "S0002");
        // The new second is still accumulating.
        assert_eq!(state.open_bars(), 1);
        assert_eq!(state.last_sec(), 1001);
    }

    #[test]
    fn first_tick_never_flushes() {
        let mut state = AggState::new();
        assert!(state.apply(&tick("S0001", 123, 1.0, 1.0, 1.0, 1)).is_empty());
        assert_eq!(state.open_bars(), 1);
    }

    #[test]
    fn backward_jump_flushes_like_any_change() {
        let mut state = AggState::new();
        state.apply(&tick("S0001", 1005, 1.1, 1.0, 1.05, 10));
        let closed = state.apply(&tick("S0001", 1003, 1.0, 1.0, 1.0, 1));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].ts, 1005);
        assert_eq!(state.last_sec(), 1003);
    }

    #[test]
    fn open_bars_always_share_last_sec() {
        let mut state = AggState::new();
        for (sym, ts) in [("S0001", 1000), ("S0002", 1000), ("S0003", 1001), ("S0001", 1001)] {
            state.apply(&tick(sym, ts, 1.0, 1.0, 1.0, 1));
            // Invariant: between applications every open bar carries last_sec.
            assert!(state.bars.values().all(|b| b.ts == state.last_sec));
        }
    }

    #[test]
    fn stalled_stream_leaves_bars_open() {
        let mut state = AggState::new();
        state.apply(&tick("S0001", 1000, 1.1, 1.0, 1.05, 10));
        state.apply(&tick("S0001", 1000, 1.1, 1.0, 1.05, 10));
        assert_eq!(state.open_bars(), 1);
    }
}
