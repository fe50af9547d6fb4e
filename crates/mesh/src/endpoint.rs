//! Local endpoint resolution
//!
//! The address a process announces is resolved once, at startup, and never
//! changes afterwards.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use tracing::{debug, warn};

/// Address used only to pick the outbound interface; nothing is sent to it
const ROUTE_PROBE: &str = "8.8.8.8:80";

/// Immutable description of this process on the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEndpoint {
    unit_id: String,
    address: IpAddr,
    command_port: u16,
    broadcast_address: IpAddr,
    broadcast_port: u16,
}

impl LocalEndpoint {
    /// Resolve the endpoint from configuration, auto-detecting the address
    /// when none is configured.
    pub fn resolve(
        unit_id: impl Into<String>,
        configured: Option<IpAddr>,
        command_port: u16,
        broadcast_port: u16,
    ) -> Self {
        let address = configured.or_else(detect_address).unwrap_or_else(|| {
            warn!("could not detect a LAN address, falling back to loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });

        let endpoint = Self {
            unit_id: unit_id.into(),
            address,
            command_port,
            broadcast_address: subnet_broadcast(address),
            broadcast_port,
        };
        debug!(
            address = %endpoint.address,
            broadcast = %endpoint.broadcast_address,
            "local endpoint resolved"
        );
        endpoint
    }

    /// Identifier announced to peers
    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    /// Own IP address
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Address peers use to send commands to this process
    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.command_port)
    }

    /// Destination for beacons
    pub fn broadcast_addr(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_address, self.broadcast_port)
    }
}

/// Outbound IPv4/IPv6 address chosen by the routing table
pub fn detect_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    // connect() on UDP only selects a route
    socket.connect(ROUTE_PROBE).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// `a.b.c.255` for IPv4, all-nodes multicast for IPv6
pub fn subnet_broadcast(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            IpAddr::V4(Ipv4Addr::new(a, b, c, 255))
        }
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1)),
    }
}
