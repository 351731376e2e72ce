//! One live subscriber connection with an ordered, drop-on-slow write path.
//!
//! All session state lives inside a single task that owns the socket and a
//! bounded mailbox: enqueue order is write order, at most one write is in
//! flight, and no flag/queue interleaving exists to race. When the mailbox is
//! full the frame is dropped whole; a frame is either written in full or not
//! at all, so the receiver's newline framing never desynchronizes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct Session {
    id: u64,
    tx: mpsc::Sender<String>,
    closed: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl Session {
    /// Take ownership of an accepted socket and start the session task.
    pub fn start(id: u64, stream: TcpStream, queue_depth: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_depth);
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(session_task(id, stream, rx, closed.clone()));
        Arc::new(Self {
            id,
            tx,
            closed,
            dropped: AtomicU64::new(0),
        })
    }

    /// Enqueue one signed frame (no trailing newline); the newline is
    /// appended here. Never blocks: a full mailbox drops the frame whole.
    pub fn deliver(&self, frame: &str) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut line = String::with_capacity(frame.len() + 1);
        line.push_str(frame);
        line.push('\n');
        match self.tx.try_send(line) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Frames refused at the high watermark since the session started.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn session_task(
    id: u64,
    mut stream: TcpStream,
    mut rx: mpsc::Receiver<String>,
    closed: Arc<AtomicBool>,
) {
    let (mut rd, mut wr) = stream.split();
    let mut buf = [0u8; 512];
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    if let Err(e) = wr.write_all(line.as_bytes()).await {
                        warn!(session = id, error = %e, "subscriber write failed, closing");
                        break;
                    }
                }
                None => break,
            },
            // The protocol is one-way; inbound bytes only signal liveness.
            r = rd.read(&mut buf) => match r {
                Ok(0) => {
                    debug!(session = id, "subscriber closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(session = id, error = %e, "subscriber read failed, closing");
                    break;
                }
            },
        }
    }
    closed.store(true, Ordering::Release);
}
