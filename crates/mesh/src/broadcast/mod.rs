//! Periodic beacons
//!
//! A unit emits heartbeat, position and shared-entity beacons on independent
//! schedules from inside its control loop. Beacons are best-effort: a failed
//! send is logged and forgotten.

mod handler;
mod receiver;
mod throttle;
mod transport;

pub use handler::BroadcastHandler;
pub use receiver::{BeaconReceiver, BeaconSink};
pub use throttle::BroadcastThrottle;
pub use transport::{BroadcastTransport, SimulatedChannel, UdpBroadcastTransport};
