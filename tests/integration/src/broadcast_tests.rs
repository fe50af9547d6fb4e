//! Beacon flow from unit control loops into the console roster

use std::net::SocketAddr;
use std::sync::Arc;
use swarmlink_core::broadcast::{BroadcastMessage, BroadcastVariant};
use swarmlink_core::capability::ActionTrigger;
use swarmlink_core::entity::{Affiliation, Entity, EntityKind, EntitySetMode};
use swarmlink_core::envelope::EntitySet;
use swarmlink_core::types::Coordinate;
use swarmlink_mesh::{BeaconSink, BroadcastHandler, SimulatedChannel};
use swarmlink_unit_status::{LocalUnit, UnitDirectory, UnitRoster, DEFAULT_STALE_AFTER};

fn drain_into(
    inbox: &mut tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    roster: &UnitRoster,
) -> usize {
    let from: SocketAddr = "10.0.0.1:8888".parse().unwrap();
    let mut received = 0;
    while let Ok(datagram) = inbox.try_recv() {
        let beacon = BroadcastMessage::from_datagram(&datagram).unwrap();
        roster.on_beacon(&beacon, from);
        received += 1;
    }
    received
}

#[test]
fn test_control_loop_beacons_populate_the_roster() {
    let channel = SimulatedChannel::new(500.0);
    let mut console_inbox = channel.join("console");
    let _unit_inbox = channel.join("drone-1");
    let roster = UnitRoster::new(DEFAULT_STALE_AFTER, 10101);

    let unit = Arc::new(LocalUnit::new("drone-1", vec!["Wander".into()]));
    unit.set_position(Coordinate::new(38.7, -9.1), Some(45.0));
    unit.start_behavior("Wander", "");
    let mut handler = BroadcastHandler::new(unit.clone(), channel.clone())
        .with_address("10.0.0.11:10101");
    handler
        .register(BroadcastVariant::Heartbeat, 10)
        .register(BroadcastVariant::Position, 5);

    let mut sent = 0;
    for tick in 1..=20 {
        sent += handler.update(tick);
    }
    // heartbeats at 10 and 20, positions at 5, 10, 15 and 20
    assert_eq!(sent, 6);
    assert_eq!(drain_into(&mut console_inbox, &roster), 6);

    let info = roster.get("drone-1").unwrap();
    assert_eq!(info.status, "Running Wander");
    assert_eq!(info.active_behavior.as_deref(), Some("Wander"));
    assert_eq!(info.position, Some(Coordinate::new(38.7, -9.1)));
    assert_eq!(info.address.as_deref(), Some("10.0.0.11:10101"));
    assert_eq!(roster.units().len(), 1);
}

#[test]
fn test_out_of_range_units_stay_unknown() {
    let channel = SimulatedChannel::new(100.0);
    let mut console_inbox = channel.join("console");
    let _far_inbox = channel.join("drone-far");
    channel.set_position("console", Coordinate::new(45.0, 7.0));
    channel.set_position("drone-far", Coordinate::new(45.1, 7.0));
    let roster = UnitRoster::new(DEFAULT_STALE_AFTER, 10101);

    let far = Arc::new(LocalUnit::new("drone-far", vec![]));
    let mut handler = BroadcastHandler::new(far, channel.clone());
    handler.register(BroadcastVariant::Heartbeat, 1);
    assert_eq!(handler.update(1), 1);

    assert_eq!(drain_into(&mut console_inbox, &roster), 0);
    assert!(roster.is_empty());
}

#[test]
fn test_shared_locations_are_relayed() {
    let channel = SimulatedChannel::new(500.0);
    let mut console_inbox = channel.join("console");
    let _inbox = channel.join("drone-1");
    let roster = UnitRoster::new(DEFAULT_STALE_AFTER, 10101);

    let unit = Arc::new(LocalUnit::new("drone-1", vec![]));
    let sighting = Entity::new(
        "intruder",
        EntityKind::SharedLocation {
            position: Coordinate::new(38.71, -9.12),
            heading_deg: Some(270.0),
            observer: "drone-1".into(),
            affiliation: Affiliation::Enemy,
        },
        42,
    );
    unit.replace_entities(&EntitySet {
        mode: EntitySetMode::Replace,
        entities: vec![sighting.clone()],
    });
    let mut handler = BroadcastHandler::new(unit, channel.clone());
    handler.register(BroadcastVariant::SharedEntityLocation, 3);

    for tick in 1..=3 {
        handler.update(tick);
    }
    assert_eq!(drain_into(&mut console_inbox, &roster), 1);
    assert_eq!(roster.shared_entities(), vec![sighting]);
}
