//! Console relay tests: roster discovery, selection, relay and queries

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use swarmlink_c2_router::{CommandRelay, OperatorCommand, RelayError, TargetSelection};
use swarmlink_core::broadcast::{BroadcastMessage, BroadcastPayload};
use swarmlink_core::capability::UnitState;
use swarmlink_core::entity::{Entity, EntityKind, EntitySetMode, EntityStore};
use swarmlink_core::envelope::Envelope;
use swarmlink_core::types::{now_ms, Coordinate};
use swarmlink_mesh::{Binding, CommandSender, DeliveryStatus};
use swarmlink_unit_status::{MotorTargets, UnitRoster, DEFAULT_STALE_AFTER};

use crate::test_utils::{closed_port, eventually, TestUnit};

fn announce(roster: &UnitRoster, unit_id: &str, addr: SocketAddr) {
    roster.observe_at(
        &BroadcastMessage {
            unit_id: unit_id.into(),
            address: Some(addr.to_string()),
            seq: 1,
            payload: BroadcastPayload::Heartbeat {
                status: "Idle".into(),
                active_behavior: None,
                uptime_secs: 0.5,
            },
        },
        addr,
        now_ms(),
    );
}

fn console(roster: Arc<UnitRoster>) -> CommandRelay {
    CommandRelay::new(
        CommandSender::new("console", Duration::from_secs(2)),
        roster,
        Binding::unbound(),
        Arc::new(EntityStore::new()),
    )
}

#[tokio::test]
async fn test_console_drives_the_selected_unit() {
    let unit = TestUnit::spawn("drone-1").await;
    let roster = Arc::new(UnitRoster::new(DEFAULT_STALE_AFTER, 10101));
    announce(&roster, "drone-1", unit.addr);
    let relay = console(roster);

    relay.select("drone-1").unwrap();
    tracing::info!("relaying start to the bound unit");
    let command: OperatorCommand = "start Wander radius=5".parse().unwrap();
    let report = relay.relay(&command, &TargetSelection::Bound).await.unwrap();
    assert_eq!(report.status, DeliveryStatus::AllDelivered);
    let driven = unit.unit.clone();
    assert!(eventually(|| driven.active_behavior().as_deref() == Some("Wander")).await);
    assert_eq!(unit.unit.behavior_args(), "radius=5");

    let command: OperatorCommand = "motors 0.3 0.1".parse().unwrap();
    relay.relay(&command, &TargetSelection::Bound).await.unwrap();
    assert!(
        eventually(|| driven.motors()
            == MotorTargets {
                left: 0.3,
                right: 0.1
            })
        .await
    );

    match relay.query(&OperatorCommand::Status, None).await.unwrap() {
        Envelope::StatusResponse(report) => {
            assert_eq!(report.unit_id, "drone-1");
            assert_eq!(report.active_behavior.as_deref(), Some("Wander"));
        }
        other => panic!("unexpected reply {other:?}"),
    }
    unit.stop().await;
}

#[tokio::test]
async fn test_deploy_entities_replaces_the_unit_set() {
    let unit = TestUnit::spawn("drone-1").await;
    let roster = Arc::new(UnitRoster::new(DEFAULT_STALE_AFTER, 10101));
    announce(&roster, "drone-1", unit.addr);
    let relay = console(roster);
    relay.entities().apply(
        EntitySetMode::Replace,
        &[
            Entity::new(
                "wp1",
                EntityKind::Waypoint {
                    position: Coordinate::new(38.70, -9.10),
                },
                1,
            ),
            Entity::new(
                "fence",
                EntityKind::GeoFence {
                    vertices: vec![
                        Coordinate::new(38.0, -9.0),
                        Coordinate::new(38.1, -9.0),
                        Coordinate::new(38.1, -9.1),
                    ],
                },
                1,
            ),
        ],
    );

    relay
        .relay(
            &OperatorCommand::DeployEntities,
            &TargetSelection::Units(vec!["drone-1".into()]),
        )
        .await
        .unwrap();
    let driven = unit.unit.clone();
    assert!(eventually(|| driven.entities().len() == 2).await);

    match relay
        .query(&OperatorCommand::Entities, Some("drone-1"))
        .await
        .unwrap()
    {
        Envelope::EntitiesResponse(answer) => assert_eq!(answer.entities, relay.entities().snapshot()),
        other => panic!("unexpected reply {other:?}"),
    }
    unit.stop().await;
}

#[tokio::test]
async fn test_relay_to_all_reports_partial_delivery() {
    let a = TestUnit::spawn("drone-1").await;
    let b = TestUnit::spawn("drone-2").await;
    let roster = Arc::new(UnitRoster::new(DEFAULT_STALE_AFTER, 10101));
    announce(&roster, "drone-1", a.addr);
    announce(&roster, "drone-2", b.addr);
    announce(&roster, "drone-3", closed_port().await);
    let relay = console(roster);

    let report = relay
        .relay(&OperatorCommand::StopAll, &TargetSelection::All)
        .await
        .unwrap();
    assert_eq!(report.status, DeliveryStatus::Partial);
    assert_eq!(report.delivered_count(), 2);
    assert_eq!(report.results.len(), 3);

    assert!(matches!(
        relay
            .relay(
                &OperatorCommand::StopAll,
                &TargetSelection::Units(vec!["drone-9".into()])
            )
            .await,
        Err(RelayError::UnknownUnit(_))
    ));

    a.stop().await;
    b.stop().await;
}
