//! Connection registry
//!
//! The registry is the single owner of every live [`ConnectionHandle`]. Each
//! handle keeps a weak back-reference so that closing it, from whichever path
//! gets there first, removes exactly one entry.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use swarmlink_core::envelope::Envelope;
use swarmlink_core::types::now_ms;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{MeshError, MeshResult};

/// Registry-assigned connection identifier
pub type ConnectionId = u64;

/// Envelopes that may wait in one connection's outbound queue
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, worker not started yet
    Connecting,
    /// Waiting for the identification frame
    Handshaking,
    /// Exchanging envelopes
    Serving,
    /// Shutdown requested
    Closing,
    /// Worker finished
    Closed,
}

/// One live peer connection
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    remote: SocketAddr,
    connected_at_ms: u64,
    peer_name: RwLock<Option<String>>,
    state: Mutex<ConnectionState>,
    closed: AtomicBool,
    cancel: CancellationToken,
    outbound: mpsc::Sender<Envelope>,
    registry: Weak<ConnectionRegistry>,
}

impl ConnectionHandle {
    /// Registry id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote socket address
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// When the connection was accepted (Unix epoch milliseconds)
    pub fn connected_at_ms(&self) -> u64 {
        self.connected_at_ms
    }

    /// Name declared in the handshake
    pub fn peer_name(&self) -> Option<String> {
        self.peer_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_peer_name(&self, name: String) {
        *self.peer_name.write().unwrap_or_else(PoisonError::into_inner) = Some(name);
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Closing and Closed are terminal for everyone except the worker itself
        if *state == ConnectionState::Closed
            || (*state == ConnectionState::Closing && next != ConnectionState::Closed)
        {
            return;
        }
        *state = next;
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Token cancelled when the connection closes
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Queue an envelope for the connection's worker to write
    pub fn enqueue(&self, envelope: Envelope) -> MeshResult<()> {
        if self.is_closed() {
            return Err(MeshError::ConnectionClosed(self.id));
        }
        self.outbound
            .try_send(envelope)
            .map_err(|_| MeshError::ConnectionClosed(self.id))
    }

    /// Close the connection.
    ///
    /// Returns `true` for the call that actually closed it; every later call
    /// is a no-op returning `false`.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set_state(ConnectionState::Closing);
        self.cancel.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
        debug!(id = self.id, peer = %self.remote, "connection closed");
        true
    }
}

/// Address and declared name of one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    /// Connection id
    pub id: ConnectionId,
    /// Remote address
    pub address: SocketAddr,
    /// Last declared name
    pub name: Option<String>,
}

/// Outcome of [`ConnectionRegistry::broadcast_to_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Connections the envelope was queued on
    pub queued: usize,
    /// Connections whose queue was full or closed
    pub failed: usize,
}

/// Owner of every live connection
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ConnectionId, Arc<ConnectionHandle>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly accepted connection.
    ///
    /// Returns the handle and the receiving end of its outbound queue, which
    /// belongs to the connection's worker.
    pub fn register(
        self: &Arc<Self>,
        remote: SocketAddr,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<Envelope>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = Arc::new(ConnectionHandle {
            id,
            remote,
            connected_at_ms: now_ms(),
            peer_name: RwLock::new(None),
            state: Mutex::new(ConnectionState::Connecting),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            outbound,
            registry: Arc::downgrade(self),
        });
        self.lock().insert(id, Arc::clone(&handle));
        debug!(id, peer = %remote, "connection registered");
        (handle, rx)
    }

    /// Close a connection and drop it from the registry.
    ///
    /// Safe to call concurrently with [`broadcast_to_all`](Self::broadcast_to_all)
    /// and with the connection's own shutdown.
    pub fn remove(&self, handle: &ConnectionHandle) -> bool {
        handle.close()
    }

    pub(crate) fn detach(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Number of live connections
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Handle by id
    pub fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.lock().get(&id).cloned()
    }

    /// Snapshot of every live handle
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.lock().values().cloned().collect()
    }

    /// Queue `envelope` on every live connection.
    ///
    /// Best effort: a full or closed queue is counted and skipped, the
    /// others still receive it.
    pub fn broadcast_to_all(&self, envelope: &Envelope) -> BroadcastSummary {
        let mut summary = BroadcastSummary::default();
        for handle in self.snapshot() {
            match handle.enqueue(envelope.clone()) {
                Ok(()) => summary.queued += 1,
                Err(e) => {
                    warn!(id = handle.id(), peer = %handle.remote_addr(), "broadcast skipped: {}", e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// First connection whose remote host is `ip`
    pub fn find_by_address(&self, ip: IpAddr) -> Option<Arc<ConnectionHandle>> {
        self.lock()
            .values()
            .find(|h| h.remote_addr().ip() == ip)
            .cloned()
    }

    /// First connection whose declared name is `name`
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ConnectionHandle>> {
        self.lock()
            .values()
            .find(|h| h.peer_name().as_deref() == Some(name))
            .cloned()
    }

    /// Address and declared name of every live peer, ordered by id
    pub fn peers(&self) -> Vec<PeerSummary> {
        let mut peers: Vec<PeerSummary> = self
            .snapshot()
            .into_iter()
            .map(|h| PeerSummary {
                id: h.id(),
                address: h.remote_addr(),
                name: h.peer_name(),
            })
            .collect();
        peers.sort_by_key(|p| p.id);
        peers
    }

    /// Close every live connection, returning how many were closed
    pub fn close_all(&self) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|handle| handle.close())
            .count()
    }
}
