//! Stage B: upstream feed client, bar aggregation, persistence, and the
//! browser push channel.

pub mod aggregator;
pub mod push;
pub mod store;
pub mod upstream;

use serde::Serialize;

/// Process-wide gateway counters, one block per component.
#[derive(Default)]
pub struct GatewayStats {
    pub upstream: upstream::UpstreamStats,
    pub aggregator: aggregator::AggregatorStats,
    pub push: push::PushStats,
}

impl GatewayStats {
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            upstream: self.upstream.snapshot(),
            aggregator: self.aggregator.snapshot(),
            push: self.push.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatsSnapshot {
    pub upstream: upstream::UpstreamStatsSnapshot,
    pub aggregator: aggregator::AggregatorStatsSnapshot,
    pub push: push::PushStatsSnapshot,
}
