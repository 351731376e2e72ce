//! Fan-out server: accepts subscribers and broadcasts signed frames.
//!
//! The mutex guards only the session set: accept-time garbage collection
//! and broadcast enqueue. Per-session writes run on their own tasks, so the
//! lock is never held across I/O.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::session::Session;

#[derive(Default)]
pub struct FanoutStats {
    pub sessions_accepted: AtomicU64,
    pub sessions_reaped: AtomicU64,
    pub frames_broadcast: AtomicU64,
    pub frames_dropped: AtomicU64,
}

impl FanoutStats {
    pub fn snapshot(&self) -> FanoutStatsSnapshot {
        FanoutStatsSnapshot {
            sessions_accepted: self.sessions_accepted.load(Ordering::Relaxed),
            sessions_reaped: self.sessions_reaped.load(Ordering::Relaxed),
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FanoutStatsSnapshot {
    pub sessions_accepted: u64,
    pub sessions_reaped: u64,
    pub frames_broadcast: u64,
    pub frames_dropped: u64,
}

pub struct FanoutServer {
    sessions: Mutex<Vec<Arc<Session>>>,
    session_queue: usize,
    next_id: AtomicU64,
    running: AtomicBool,
    stats: FanoutStats,
}

impl FanoutServer {
    /// `session_queue` is the per-subscriber outbound high watermark.
    pub fn new(session_queue: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
            session_queue,
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(true),
            stats: FanoutStats::default(),
        })
    }

    /// Accept loop. Dead sessions are reaped lazily at each accept.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(addr = %listener.local_addr()?, "fan-out server accepting subscribers");
        while self.is_running() {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let session = Session::start(id, stream, self.session_queue);
                    let live = {
                        let mut sessions = self.sessions.lock();
                        let before = sessions.len();
                        sessions.retain(|s| !s.is_closed());
                        self.stats
                            .sessions_reaped
                            .fetch_add((before - sessions.len()) as u64, Ordering::Relaxed);
                        sessions.push(session);
                        sessions.len()
                    };
                    self.stats.sessions_accepted.fetch_add(1, Ordering::Relaxed);
                    info!(session = id, peer = %peer, live, "subscriber connected");
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
        Ok(())
    }

    /// Deliver one signed frame (no trailing newline) to every live session.
    /// Non-blocking: sessions at their high watermark drop the frame whole.
    pub fn broadcast(&self, frame: &str) {
        let sessions = self.sessions.lock();
        for session in sessions.iter() {
            if !session.deliver(frame) {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stats.frames_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn stats(&self) -> &FanoutStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
