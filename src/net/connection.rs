//! Lifecycle tracking for client connections and WebSocket bridges.
//!
//! Every accepted socket and every established bridge holds a
//! [`ConnectionGuard`]. Shutdown waits on [`ConnectionTracker::drain`] until
//! the last guard is gone or the grace period runs out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique tag used in log lines for one tracked connection or bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Live {
    count: AtomicU64,
    idle: Notify,
}

/// Shared counter of live connections and bridges.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<Live>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more live connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.live.count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(count);
        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.count.load(Ordering::SeqCst)
    }

    /// Wait for the live count to reach zero, for at most `deadline`.
    /// Returns `false` if guards were still alive when it expired.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.live.idle.notified();
                tokio::pin!(notified);
                // Register before checking so a drop in between is not missed.
                notified.as_mut().enable();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Keeps one connection or bridge counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<Live>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.live.count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(count);
        if count == 0 {
            self.live.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Untracked");
    }
}
