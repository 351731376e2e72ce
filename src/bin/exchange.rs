//! Stage A: synthetic tick exchange.
//!
//! Generates one batch of signed OHLCV ticks per second and fans each frame
//! out to every connected subscriber on the feed port.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickgate::exchange::{generator, server::FanoutServer};

#[derive(Parser, Debug)]
#[command(name = "exchange", about = "Synthetic tick generator and fan-out feed")]
struct Args {
    /// Listen address for subscriber connections
    #[arg(long, env = "EXCHANGE_BIND", default_value = "0.0.0.0:9001")]
    bind: String,

    /// Shared secret for frame signatures
    #[arg(long, env = "FEED_SECRET", default_value = tickgate::DEFAULT_SECRET)]
    secret: String,

    /// Per-subscriber outbound queue high watermark, in frames
    #[arg(long, env = "EXCHANGE_SESSION_QUEUE", default_value_t = 1024)]
    session_queue: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "exchange starting");

    let server = FanoutServer::new(args.session_queue);
    let _generator = generator::spawn(server.clone(), args.secret)?;

    tokio::select! {
        res = server.clone().run(listener) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            server.stop();
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
