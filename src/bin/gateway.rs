//! Stage B: aggregating gateway.
//!
//! Subscribes to the signed tick feed, folds same-second ticks into
//! per-symbol bars, persists each closed bar to SQLite, and pushes it to
//! browser clients over WebSocket.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickgate::gateway::{
    aggregator,
    push::{self, PushState},
    store::BarStore,
    upstream::{UpstreamClient, UpstreamConfig},
    GatewayStats,
};
use tickgate::models::Tick;
use tickgate::ring::Ring;

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Tick-aggregating gateway with browser push")]
struct Args {
    /// Upstream feed host
    #[arg(long, env = "GATEWAY_UPSTREAM_HOST", default_value = "127.0.0.1")]
    upstream_host: String,

    /// Upstream feed port
    #[arg(long, env = "GATEWAY_UPSTREAM_PORT", default_value_t = 9001)]
    upstream_port: u16,

    /// Listen address for the push channel and page
    #[arg(long, env = "GATEWAY_BIND", default_value = "0.0.0.0:9002")]
    bind: String,

    /// SQLite file for closed bars
    #[arg(long, env = "GATEWAY_DB", default_value = "tick_1min.db")]
    db: String,

    /// Static page served at /
    #[arg(long, env = "GATEWAY_PAGE", default_value = "web/index.html")]
    page: String,

    /// Ingress ring capacity, in ticks
    #[arg(long, env = "GATEWAY_RING_CAPACITY", default_value_t = 65_536)]
    ring_capacity: usize,

    /// Shared secret for frame signatures
    #[arg(long, env = "FEED_SECRET", default_value = tickgate::DEFAULT_SECRET)]
    secret: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let store = Arc::new(BarStore::open(&args.db)?);
    info!(db = %args.db, "bar store ready");

    let ring: Arc<Ring<Tick>> = Arc::new(Ring::with_capacity(args.ring_capacity));
    let (bar_tx, _) = broadcast::channel(1024);
    let stats = Arc::new(GatewayStats::default());

    let _consumer = aggregator::spawn_consumer(ring.clone(), store, bar_tx.clone(), stats.clone())?;

    let client = UpstreamClient::new(
        UpstreamConfig {
            host: args.upstream_host,
            port: args.upstream_port,
            secret: args.secret,
            ..Default::default()
        },
        ring,
        stats.clone(),
    );
    tokio::spawn(client.run());

    let app = push::router(PushState {
        bar_tx,
        page_path: Arc::new(args.page),
        stats,
    });
    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "gateway push channel listening");

    tokio::select! {
        res = async { axum::serve(listener, app).await } => {
            res.context("push channel server failed")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tickgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
