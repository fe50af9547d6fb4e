//! Beacon transports

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use swarmlink_core::types::Coordinate;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{MeshError, MeshResult};

/// Where beacons go.
///
/// `broadcast_send` is called from the control loop and must not block.
pub trait BroadcastTransport: Send + Sync {
    /// Send one datagram on behalf of `origin`
    fn broadcast_send(&self, origin: &str, datagram: &[u8]) -> MeshResult<()>;

    /// Whether `unit_b` can hear `unit_a`
    fn is_within_range(&self, _unit_a: &str, _unit_b: &str) -> bool {
        true
    }
}

/// Subnet broadcast over UDP
#[derive(Debug)]
pub struct UdpBroadcastTransport {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpBroadcastTransport {
    /// Open a broadcast-enabled socket sending to `destination`
    pub async fn bind(destination: SocketAddr) -> MeshResult<Self> {
        let bind_addr: SocketAddr = if destination.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        // try_send_to only succeeds once the reactor has seen the socket writable
        socket.writable().await?;
        info!(destination = %destination, "beacon transport ready");
        Ok(Self {
            socket,
            destination,
        })
    }

    /// Destination address
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }
}

impl BroadcastTransport for UdpBroadcastTransport {
    fn broadcast_send(&self, _origin: &str, datagram: &[u8]) -> MeshResult<()> {
        let sent = self
            .socket
            .try_send_to(datagram, self.destination)
            .map_err(|e| MeshError::BroadcastSend(e.to_string()))?;
        if sent < datagram.len() {
            return Err(MeshError::BroadcastSend(format!(
                "short send: {sent} of {} bytes",
                datagram.len()
            )));
        }
        Ok(())
    }
}

struct Member {
    position: Option<Coordinate>,
    inbox: mpsc::UnboundedSender<Vec<u8>>,
}

/// In-memory broadcast medium for simulations and tests.
///
/// Datagrams reach every other member within `range_m` of the sender. A
/// member whose position is unknown is not range-gated.
pub struct SimulatedChannel {
    range_m: f64,
    members: Mutex<HashMap<String, Member>>,
}

impl SimulatedChannel {
    /// Channel with a radio range in meters
    pub fn new(range_m: f64) -> Arc<Self> {
        Arc::new(Self {
            range_m,
            members: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the channel; the receiver yields datagrams addressed to `unit_id`
    pub fn join(&self, unit_id: impl Into<String>) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (inbox, rx) = mpsc::unbounded_channel();
        self.lock().insert(
            unit_id.into(),
            Member {
                position: None,
                inbox,
            },
        );
        rx
    }

    /// Leave the channel
    pub fn leave(&self, unit_id: &str) {
        self.lock().remove(unit_id);
    }

    /// Update a member's position
    pub fn set_position(&self, unit_id: &str, position: Coordinate) {
        if let Some(member) = self.lock().get_mut(unit_id) {
            member.position = Some(position);
        }
    }

    fn in_range(&self, a: Option<Coordinate>, b: Option<Coordinate>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a.distance_m(&b) <= self.range_m,
            _ => true,
        }
    }
}

impl BroadcastTransport for SimulatedChannel {
    fn broadcast_send(&self, origin: &str, datagram: &[u8]) -> MeshResult<()> {
        let members = self.lock();
        let sender = members
            .get(origin)
            .ok_or_else(|| MeshError::BroadcastSend(format!("{origin} has not joined the channel")))?;

        let mut delivered = 0;
        for (id, member) in members.iter().filter(|(id, _)| id.as_str() != origin) {
            if !self.in_range(sender.position, member.position) {
                continue;
            }
            if member.inbox.send(datagram.to_vec()).is_ok() {
                delivered += 1;
            } else {
                debug!(member = %id, "simulated member inbox closed");
            }
        }
        debug!(origin, delivered, "simulated beacon delivered");
        Ok(())
    }

    fn is_within_range(&self, unit_a: &str, unit_b: &str) -> bool {
        let members = self.lock();
        match (members.get(unit_a), members.get(unit_b)) {
            (Some(a), Some(b)) => self.in_range(a.position, b.position),
            _ => false,
        }
    }
}
