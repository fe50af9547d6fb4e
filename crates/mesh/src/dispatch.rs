//! Envelope dispatch
//!
//! Every message kind maps to exactly one [`Route`] through a closed table;
//! adding a kind means adding one arm to [`route`].

use std::net::SocketAddr;
use std::sync::Arc;
use swarmlink_core::capability::ActionTrigger;
use swarmlink_core::envelope::{Command, CommandAction, Envelope, MessageKind};
use swarmlink_core::provider::ProviderChain;
use tracing::{debug, info, warn};

use crate::binding::Binding;
use crate::error::MeshError;
use crate::events::{EventBus, LinkEvent};
use crate::registry::ConnectionId;

/// How a message kind is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Answered by the provider chain on the same connection
    Query,
    /// Motor actuation, applied only when addressed to the binding
    Actuation,
    /// Operator command, forwarded to the action trigger
    Command,
    /// Entity set update, applied and acknowledged
    EntityUpdate,
    /// Response-side message, published as an event
    Notification,
}

/// Route for a message kind
pub fn route(kind: MessageKind) -> Route {
    match kind {
        MessageKind::InfoRequest
        | MessageKind::StatusRequest
        | MessageKind::EntitiesRequest
        | MessageKind::Log
        | MessageKind::BehaviorControl => Route::Query,
        MessageKind::MotorSet => Route::Actuation,
        MessageKind::Command => Route::Command,
        MessageKind::EntitySet => Route::EntityUpdate,
        MessageKind::InfoResponse
        | MessageKind::StatusResponse
        | MessageKind::EntitiesResponse
        | MessageKind::Ack
        | MessageKind::Rejected => Route::Notification,
    }
}

/// Who sent the envelope being dispatched
#[derive(Debug, Clone)]
pub struct PeerContext {
    /// Connection id
    pub id: ConnectionId,
    /// Remote address
    pub address: SocketAddr,
    /// Name declared in the handshake
    pub name: String,
}

/// Routes decoded envelopes to providers, the action trigger and the event bus
pub struct Dispatcher {
    chain: ProviderChain,
    trigger: Arc<dyn ActionTrigger>,
    binding: Binding,
    events: EventBus,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        chain: ProviderChain,
        trigger: Arc<dyn ActionTrigger>,
        binding: Binding,
        events: EventBus,
    ) -> Self {
        Self {
            chain,
            trigger,
            binding,
            events,
        }
    }

    /// Event bus fed by this dispatcher
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Binding consulted for motor commands
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Provider chain answering queries
    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Handle one envelope, returning the reply to write back, if any
    pub fn dispatch(&self, peer: &PeerContext, envelope: Envelope) -> Option<Envelope> {
        let kind = envelope.kind();
        debug!(peer = %peer.name, kind = %kind, "dispatching");

        match route(kind) {
            Route::Query => self.answer(peer, &envelope),
            Route::Actuation => {
                self.actuate(peer, envelope);
                None
            }
            Route::Command => {
                self.command(peer, envelope);
                None
            }
            Route::EntityUpdate => self.update_entities(peer, envelope),
            Route::Notification => {
                self.events.publish(LinkEvent::NotificationReceived {
                    from: peer.name.clone(),
                    envelope,
                });
                None
            }
        }
    }

    fn answer(&self, peer: &PeerContext, request: &Envelope) -> Option<Envelope> {
        match self.chain.answer(request) {
            Some((provider, answer)) => {
                debug!(peer = %peer.name, provider, kind = %request.kind(), "answered");
                Some(answer)
            }
            None => {
                let miss = MeshError::DispatchMiss {
                    kind: request.kind(),
                };
                warn!(peer = %peer.name, "{}", miss);
                Some(Envelope::rejected(Some(request.kind()), miss.to_string()))
            }
        }
    }

    fn actuate(&self, peer: &PeerContext, envelope: Envelope) {
        let Envelope::MotorSet(motors) = envelope else {
            return;
        };

        if self.binding.matches(&motors) {
            self.trigger.apply_motor_command(&motors);
            self.events.publish(LinkEvent::MotorsApplied {
                from: peer.name.clone(),
                motors,
            });
        } else {
            debug!(
                peer = %peer.name,
                target_name = ?motors.target_name,
                target_address = ?motors.target_address,
                "motor command not addressed to us, ignored"
            );
            self.events.publish(LinkEvent::MotorsIgnored {
                from: peer.name.clone(),
                motors,
            });
        }
    }

    fn command(&self, peer: &PeerContext, envelope: Envelope) {
        let Envelope::Command(command) = envelope else {
            return;
        };

        info!(peer = %peer.name, action = %command.action, args = ?command.args, "command received");
        self.apply_command(&command);
        self.events.publish(LinkEvent::CommandReceived {
            from: peer.name.clone(),
            command,
        });
    }

    fn apply_command(&self, command: &Command) {
        match command.action {
            CommandAction::Start | CommandAction::Deploy => match command.arg(0) {
                Some(behavior) => self
                    .trigger
                    .start_behavior(behavior, command.arg(1).unwrap_or_default()),
                None => warn!(action = %command.action, "command without behavior name"),
            },
            CommandAction::Stop => match command.arg(0) {
                Some(behavior) => self.trigger.stop_behavior(behavior),
                None => warn!(action = %command.action, "command without behavior name"),
            },
            CommandAction::StopAll => self.trigger.stop_all(),
            CommandAction::DeployEntities => self.trigger.deploy_entities(),
            CommandAction::SetLogStamp => match command.arg(0) {
                Some(stamp) => self.trigger.set_log_stamp(stamp),
                None => warn!("set_log_stamp without a stamp"),
            },
        }
    }

    fn update_entities(&self, peer: &PeerContext, envelope: Envelope) -> Option<Envelope> {
        let Envelope::EntitySet(update) = envelope else {
            return None;
        };

        self.trigger.replace_entities(&update);
        debug!(
            peer = %peer.name,
            mode = ?update.mode,
            count = update.entities.len(),
            "entity update applied"
        );
        self.events.publish(LinkEvent::EntitiesReplaced {
            from: peer.name.clone(),
            update,
        });
        Some(Envelope::ack(MessageKind::EntitySet))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("chain", &self.chain)
            .field("binding", &self.binding)
            .finish()
    }
}
