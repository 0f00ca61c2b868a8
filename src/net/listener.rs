//! Bounded TCP listener shared by the secure and redirect ports.
//!
//! A connection slot is taken before `accept`, so once `max_connections`
//! sockets are open the kernel backlog absorbs new clients instead of the
//! process.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Transient; the accept loop logs it and keeps going.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),
    #[error("listener closed")]
    Closed,
}

pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
}

impl Listener {
    /// Bind `address` (an `ip:port` literal) with room for `max_connections`.
    pub async fn bind(address: &str, max_connections: usize) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            addr: address.to_string(),
            source,
        };
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| bind_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let socket = TcpListener::bind(addr).await.map_err(bind_error)?;

        tracing::info!(
            address = %socket.local_addr().unwrap_or(addr),
            max_connections,
            "Listener bound"
        );
        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(max_connections)),
        })
    }

    /// Wait for a free slot, then for a client. The slot is released when
    /// the returned permit is dropped.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %peer, error = %e, "set_nodelay failed");
        }
        tracing::debug!(
            peer_addr = %peer,
            free_slots = self.slots.available_permits(),
            "Connection accepted"
        );
        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// One occupied connection slot.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slots_are_returned_on_drop() {
        let listener = Listener::bind("127.0.0.1:0", 2).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.slots.available_permits(), 2);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_server, peer, permit) = listener.accept().await.unwrap();
        assert!(peer.ip().is_loopback());
        assert_eq!(listener.slots.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.slots.available_permits(), 2);
    }

    #[tokio::test]
    async fn full_listener_waits_for_a_slot() {
        let listener = Listener::bind("127.0.0.1:0", 1).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();
        let (_s, _, permit) = listener.accept().await.unwrap();

        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;
        assert!(blocked.is_err());

        drop(permit);
        assert!(listener.accept().await.is_ok());
    }

    #[tokio::test]
    async fn hostname_is_not_a_bind_address() {
        let err = Listener::bind("localhost:443", 1).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert!(err.to_string().contains("localhost:443"));
    }
}
