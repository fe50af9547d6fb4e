//! Link events published to the console (or any other observer)

use std::net::SocketAddr;
use swarmlink_core::envelope::{Command, EntitySet, Envelope, MotorSet};
use tokio::sync::broadcast;

use crate::registry::ConnectionId;

const DEFAULT_CAPACITY: usize = 256;

/// Something observable happened on a connection
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A peer completed the handshake
    PeerConnected {
        /// Connection id
        id: ConnectionId,
        /// Remote address
        address: SocketAddr,
        /// Declared peer name
        name: String,
    },
    /// A connection was closed
    PeerDisconnected {
        /// Connection id
        id: ConnectionId,
        /// Remote address
        address: SocketAddr,
        /// Declared peer name, if the handshake completed
        name: Option<String>,
    },
    /// A motor command matched the binding and was applied
    MotorsApplied {
        /// Sending peer
        from: String,
        /// The command
        motors: MotorSet,
    },
    /// A motor command addressed to someone else was dropped
    MotorsIgnored {
        /// Sending peer
        from: String,
        /// The command
        motors: MotorSet,
    },
    /// An operator command was forwarded to the action trigger
    CommandReceived {
        /// Sending peer
        from: String,
        /// The command
        command: Command,
    },
    /// The entity set was updated
    EntitiesReplaced {
        /// Sending peer
        from: String,
        /// The update
        update: EntitySet,
    },
    /// A response, ack or rejection arrived
    NotificationReceived {
        /// Sending peer
        from: String,
        /// The notification
        envelope: Envelope,
    },
}

/// Fan-out of [`LinkEvent`]s; publishing never blocks
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LinkEvent>,
}

impl EventBus {
    /// Bus keeping at most `capacity` unread events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscriber; sees events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: LinkEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
