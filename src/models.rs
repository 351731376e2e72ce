//! Tick and bar records shared by both stages.

use serde::{Deserialize, Serialize};

/// A single synthetic OHLCV observation at second granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    /// Seconds since epoch. Some upstream peers label this `timestamp`.
    #[serde(alias = "timestamp")]
    pub ts: i64,
}

impl Tick {
    /// Wire body for this tick, prices at exactly five fractional digits.
    pub fn to_wire_json(&self) -> String {
        format!(
            "{{\"symbol\":\"{}\",\"open\":{:.5},\"high\":{:.5},\"low\":{:.5},\"close\":{:.5},\"volume\":{},\"ts\":{}}}",
            self.symbol, self.open, self.high, self.low, self.close, self.volume, self.ts
        )
    }
}

/// Aggregate of one symbol's ticks over one accumulation second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Seed a bar from the first tick of an accumulation window.
    ///
    /// `open` is seeded from the tick's *close*, not its `open` field; the
    /// feed contract pins this behavior.
    pub fn open_from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            ts: tick.ts,
            open: tick.close,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            volume: tick.volume,
        }
    }

    /// Fold a same-window tick into the bar. `open` and `ts` never move.
    pub fn update(&mut self, tick: &Tick) {
        self.high = self.high.max(tick.high);
        self.low = self.low.min(tick.low);
        self.close = tick.close;
        self.volume += tick.volume;
    }
}
