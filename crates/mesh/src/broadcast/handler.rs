use std::sync::Arc;
use swarmlink_core::broadcast::{BroadcastMessage, BroadcastPayload, BroadcastVariant};
use swarmlink_core::capability::UnitState;
use tracing::{debug, warn};

use super::throttle::BroadcastThrottle;
use super::transport::BroadcastTransport;

/// Tick-driven beacon emitter.
///
/// [`update`](Self::update) is called once per control step. Each registered
/// variant has its own [`BroadcastThrottle`]; when a variant is due its
/// payload is built from the current [`UnitState`] and handed to the
/// transport.
pub struct BroadcastHandler {
    state: Arc<dyn UnitState>,
    transport: Arc<dyn BroadcastTransport>,
    address: Option<String>,
    schedule: Vec<(BroadcastVariant, BroadcastThrottle)>,
    seq: u64,
}

impl BroadcastHandler {
    /// Handler with no variants registered
    pub fn new(state: Arc<dyn UnitState>, transport: Arc<dyn BroadcastTransport>) -> Self {
        Self {
            state,
            transport,
            address: None,
            schedule: Vec::new(),
            seq: 0,
        }
    }

    /// Command address announced in every beacon
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Emit `variant` every `period_ticks` ticks, replacing any earlier schedule for it
    pub fn register(&mut self, variant: BroadcastVariant, period_ticks: u64) -> &mut Self {
        let throttle = BroadcastThrottle::new(period_ticks);
        match self.schedule.iter_mut().find(|(v, _)| *v == variant) {
            Some(entry) => entry.1 = throttle,
            None => self.schedule.push((variant, throttle)),
        }
        self
    }

    /// Registered variants, in registration order
    pub fn variants(&self) -> Vec<BroadcastVariant> {
        self.schedule.iter().map(|(v, _)| *v).collect()
    }

    /// Sequence number of the last beacon built
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    /// Run one control step, returning how many beacons were handed to the transport
    pub fn update(&mut self, tick: u64) -> usize {
        let mut sent = 0;
        for index in 0..self.schedule.len() {
            let (variant, throttle) = self.schedule[index];
            if !throttle.is_ready(tick) {
                continue;
            }

            let payloads = self.build(variant);
            if payloads.is_empty() {
                // nothing to report yet; stay due
                continue;
            }
            self.schedule[index].1.record(tick);

            for payload in payloads {
                if self.emit(payload) {
                    sent += 1;
                }
            }
        }
        sent
    }

    fn build(&self, variant: BroadcastVariant) -> Vec<BroadcastPayload> {
        match variant {
            BroadcastVariant::Heartbeat => vec![BroadcastPayload::Heartbeat {
                status: self.state.status(),
                active_behavior: self.state.active_behavior(),
                uptime_secs: self.state.time_since_start().as_secs_f64(),
            }],
            BroadcastVariant::Position => self
                .state
                .position()
                .map(|position| BroadcastPayload::Position {
                    position,
                    orientation_deg: self.state.orientation_deg(),
                })
                .into_iter()
                .collect(),
            BroadcastVariant::SharedEntityLocation => self
                .state
                .entities()
                .into_iter()
                .filter(|e| e.is_shared_location())
                .map(|entity| BroadcastPayload::SharedEntityLocation { entity })
                .collect(),
        }
    }

    fn emit(&mut self, payload: BroadcastPayload) -> bool {
        self.seq += 1;
        let variant = payload.variant();
        let message = BroadcastMessage {
            unit_id: self.state.unit_id().to_string(),
            address: self.address.clone(),
            seq: self.seq,
            payload,
        };

        let result = message
            .to_datagram()
            .map_err(crate::error::MeshError::from)
            .and_then(|datagram| self.transport.broadcast_send(&message.unit_id, &datagram));
        match result {
            Ok(()) => {
                debug!(variant = %variant, seq = self.seq, "beacon sent");
                true
            }
            Err(e) => {
                warn!(variant = %variant, seq = self.seq, "beacon dropped: {}", e);
                false
            }
        }
    }
}
