//! Opaque bidirectional byte relay for upgraded connections.
//!
//! # Data Flow
//! ```text
//!            ┌── upstream task:   client ──bytes──▶ backend ──┐
//! Bridge ────┤                                                ├── first to finish
//!            └── downstream task: backend ──bytes──▶ client ──┘   ends the bridge
//! ```
//!
//! # Design Decisions
//! - Two independent tasks; a stalled direction never blocks the other
//! - No frame inspection, no buffering beyond one read chunk
//! - Coordination through join handles, an activity channel, and the
//!   shutdown broadcast
//! - After the first direction ends, the other gets `grace` to finish,
//!   then it is aborted and both sockets drop

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::observability::metrics;

const CHUNK_SIZE: usize = 16 * 1024;

/// Stand-in deadline for idle windows too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Why a bridge ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEnd {
    /// The client closed its side (or the upstream write finished cleanly).
    ClientClosed,
    /// The backend closed its side.
    BackendClosed,
    /// A read or write failed in either direction.
    Error,
    /// No bytes moved in either direction for the idle window.
    Idle,
    /// Process shutdown.
    Shutdown,
}

impl BridgeEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeEnd::ClientClosed => "client_closed",
            BridgeEnd::BackendClosed => "backend_closed",
            BridgeEnd::Error => "error",
            BridgeEnd::Idle => "idle",
            BridgeEnd::Shutdown => "shutdown",
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone, Copy)]
pub struct Bridge {
    idle: Duration,
    grace: Duration,
}

impl Bridge {
    pub fn new(idle: Duration, grace: Duration) -> Self {
        Self { idle, grace }
    }

    /// Relay bytes until one side closes, errors, idles out, or shutdown fires.
    pub async fn run<C, B>(
        &self,
        client: C,
        backend: B,
        mut shutdown: broadcast::Receiver<()>,
    ) -> BridgeEnd
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        B: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_rd, client_wr) = tokio::io::split(client);
        let (backend_rd, backend_wr) = tokio::io::split(backend);
        let (activity_tx, mut activity_rx) = mpsc::channel::<()>(1);

        let mut upstream = tokio::spawn(pump(client_rd, backend_wr, activity_tx.clone()));
        let mut downstream = tokio::spawn(pump(backend_rd, client_wr, activity_tx));

        metrics::record_bridge_opened();

        let idle = tokio::time::sleep_until(self.idle_deadline());
        tokio::pin!(idle);

        let end = loop {
            tokio::select! {
                res = &mut upstream => {
                    let end = classify(res, BridgeEnd::ClientClosed);
                    self.finish(downstream).await;
                    break end;
                }
                res = &mut downstream => {
                    let end = classify(res, BridgeEnd::BackendClosed);
                    self.finish(upstream).await;
                    break end;
                }
                Some(()) = activity_rx.recv() => {
                    idle.as_mut().reset(self.idle_deadline());
                }
                () = &mut idle => {
                    upstream.abort();
                    downstream.abort();
                    break BridgeEnd::Idle;
                }
                _ = shutdown.recv() => {
                    upstream.abort();
                    downstream.abort();
                    break BridgeEnd::Shutdown;
                }
            }
        };

        metrics::record_bridge_closed(end.as_str());
        end
    }

    fn idle_deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.idle).unwrap_or(now + FAR_FUTURE)
    }

    /// Give the surviving direction `grace` to drain, then abort it.
    async fn finish(&self, mut remaining: JoinHandle<std::io::Result<u64>>) {
        if tokio::time::timeout(self.grace, &mut remaining).await.is_err() {
            tracing::debug!(grace = ?self.grace, "Bridge direction still open after grace period, aborting");
            remaining.abort();
        }
    }
}

fn classify(
    res: Result<std::io::Result<u64>, tokio::task::JoinError>,
    clean: BridgeEnd,
) -> BridgeEnd {
    match res {
        Ok(Ok(_)) => clean,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Bridge direction failed");
            BridgeEnd::Error
        }
        Err(_) => BridgeEnd::Error,
    }
}

/// Copy one direction verbatim. Half-closes the writer on EOF.
async fn pump<R, W>(mut reader: R, mut writer: W, activity: mpsc::Sender<()>) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            writer.shutdown().await?;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
        let _ = activity.try_send(());
    }
}
