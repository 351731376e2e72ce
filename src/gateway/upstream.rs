//! Reconnecting TCP client for the signed tick feed.
//!
//! Resolve, connect to the first endpoint that accepts, read newline-framed
//! lines, verify, and push each tick into the ingress ring. Any failure
//! closes the link and re-resolves after a fixed backoff; the process never
//! needs a restart to recover.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info, warn};

use super::GatewayStats;
use crate::models::Tick;
use crate::ring::Ring;
use crate::wire::{self, WireError};

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
    /// Pause between a link failure and the next resolve.
    pub backoff: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9001,
            secret: crate::DEFAULT_SECRET.to_string(),
            backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
pub struct UpstreamStats {
    pub frames_received: AtomicU64,
    pub frames_enqueued: AtomicU64,
    pub rejected_signature: AtomicU64,
    pub rejected_body: AtomicU64,
    pub ring_dropped: AtomicU64,
    pub reconnects: AtomicU64,
}

impl UpstreamStats {
    pub fn snapshot(&self) -> UpstreamStatsSnapshot {
        UpstreamStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_enqueued: self.frames_enqueued.load(Ordering::Relaxed),
            rejected_signature: self.rejected_signature.load(Ordering::Relaxed),
            rejected_body: self.rejected_body.load(Ordering::Relaxed),
            ring_dropped: self.ring_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatsSnapshot {
    pub frames_received: u64,
    pub frames_enqueued: u64,
    pub rejected_signature: u64,
    pub rejected_body: u64,
    pub ring_dropped: u64,
    pub reconnects: u64,
}

pub struct UpstreamClient {
    config: UpstreamConfig,
    ring: Arc<Ring<Tick>>,
    stats: Arc<GatewayStats>,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig, ring: Arc<Ring<Tick>>, stats: Arc<GatewayStats>) -> Self {
        Self { config, ring, stats }
    }

    /// Process-lifetime loop: resolve → connect → read, backoff on failure.
    pub async fn run(self) {
        loop {
            if let Err(e) = self.connect_and_read().await {
                warn!(error = %e, "upstream link failed, reconnecting");
            }
            self.stats.upstream.reconnects.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(self.config.backoff).await;
        }
    }

    async fn connect_and_read(&self) -> Result<()> {
        let addrs: Vec<_> = lookup_host((self.config.host.as_str(), self.config.port))
            .await
            .with_context(|| format!("resolving {}:{}", self.config.host, self.config.port))?
            .collect();

        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    info!(peer = %addr, "connected to upstream feed");
                    stream = Some(s);
                    break;
                }
                Err(e) => debug!(peer = %addr, error = %e, "endpoint refused"),
            }
        }
        let Some(stream) = stream else {
            bail!("no resolved endpoint accepted the connection");
        };

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .await
                .context("upstream read failed")?;
            if n == 0 {
                bail!("upstream closed the connection");
            }
            self.on_line(&line);
        }
    }

    fn on_line(&self, line: &str) {
        let stats = &self.stats.upstream;
        stats.frames_received.fetch_add(1, Ordering::Relaxed);
        match wire::decode_line(&self.config.secret, line) {
            Ok(tick) => {
                if self.ring.push(tick) {
                    stats.frames_enqueued.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.ring_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("ingress ring full, frame dropped");
                }
            }
            Err(e @ (WireError::MissingSignature | WireError::BadSignature)) => {
                stats.rejected_signature.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "frame rejected");
            }
            Err(e @ WireError::BadBody(_)) => {
                stats.rejected_body.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "frame rejected");
            }
        }
    }
}
