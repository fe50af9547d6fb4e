//! Unit link tests over loopback TCP

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use swarmlink_core::capability::ActionTrigger;
use swarmlink_core::codec;
use swarmlink_core::envelope::{Command, CommandAction, Envelope, MotorSet, StatusRequest};
use swarmlink_mesh::{CommandSender, DeliveryStatus, LinkEvent};
use swarmlink_unit_status::MotorTargets;

use crate::test_utils::{closed_port, connect, eventually, next_event, TestUnit};

#[tokio::test]
async fn test_status_query_over_tcp() {
    let unit = TestUnit::spawn("drone-1").await;
    let sender = CommandSender::new("console", Duration::from_secs(2));

    let reply = sender
        .request(&Envelope::StatusRequest(StatusRequest {}), unit.addr)
        .await
        .unwrap();
    match reply {
        Envelope::StatusResponse(report) => {
            assert_eq!(report.unit_id, "drone-1");
            assert_eq!(report.status, "Idle");
            assert_eq!(report.connected_clients, 1);
            assert_eq!(report.connected_to.as_deref(), Some("127.0.0.1"));
        }
        other => panic!("unexpected reply {other:?}"),
    }
    unit.stop().await;
}

#[tokio::test]
async fn test_motor_set_for_other_unit_is_ignored() {
    let unit = TestUnit::spawn("A").await;
    let mut events = unit.events.subscribe();
    let mut client = connect(unit.addr, "joystick").await;

    let for_b = MotorSet {
        left: 0.9,
        right: 0.9,
        target_name: Some("B".into()),
        ..MotorSet::default()
    };
    let for_a = MotorSet {
        left: 0.2,
        right: -0.2,
        target_name: Some("A".into()),
        ..MotorSet::default()
    };
    client
        .send(codec::encode(&Envelope::MotorSet(for_b.clone())).unwrap())
        .await
        .unwrap();
    client
        .send(codec::encode(&Envelope::MotorSet(for_a.clone())).unwrap())
        .await
        .unwrap();

    match next_event(&mut events, |e| {
        matches!(e, LinkEvent::MotorsIgnored { .. } | LinkEvent::MotorsApplied { .. })
    })
    .await
    {
        LinkEvent::MotorsIgnored { motors, .. } => assert_eq!(motors, for_b),
        other => panic!("expected the first command to be ignored, got {other:?}"),
    }
    match next_event(&mut events, |e| matches!(e, LinkEvent::MotorsApplied { .. })).await {
        LinkEvent::MotorsApplied { from, motors } => {
            assert_eq!(from, "joystick");
            assert_eq!(motors, for_a);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        unit.unit.motors(),
        MotorTargets {
            left: 0.2,
            right: -0.2
        }
    );
    unit.stop().await;
}

#[tokio::test]
async fn test_bad_frames_do_not_close_the_connection() {
    let unit = TestUnit::spawn("drone-1").await;
    let mut client = connect(unit.addr, "console").await;

    client.send(Bytes::from_static(b"{not json")).await.unwrap();
    client
        .send(Bytes::from_static(br#"{"type":"teleport","payload":{}}"#))
        .await
        .unwrap();
    client
        .send(Bytes::from_static(br#"{"type":"motor_set","payload":{"left":"fast"}}"#))
        .await
        .unwrap();
    client
        .send(codec::encode(&Envelope::StatusRequest(StatusRequest {})).unwrap())
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(
        codec::decode(&frame).unwrap(),
        Envelope::StatusResponse(_)
    ));
    unit.stop().await;
}

#[tokio::test]
async fn test_registry_counts_live_connections() {
    let unit = TestUnit::spawn("drone-1").await;

    let mut clients = Vec::new();
    for i in 0..5 {
        clients.push(connect(unit.addr, &format!("client-{i}")).await);
    }
    let registry = unit.registry.clone();
    assert!(eventually(|| registry.count() == 5).await);

    clients.truncate(3);
    assert!(eventually(|| registry.count() == 3).await);
    assert_eq!(registry.peers().len(), 3);

    drop(clients);
    unit.stop().await;
}

#[tokio::test]
async fn test_stop_all_reaches_every_unit() {
    let a = TestUnit::spawn("drone-1").await;
    let b = TestUnit::spawn("drone-2").await;
    a.unit.apply_motor_command(&MotorSet {
        left: 0.5,
        right: 0.5,
        ..MotorSet::default()
    });
    let mut events_a = a.events.subscribe();
    let mut events_b = b.events.subscribe();
    let dead = closed_port().await;

    let sender = CommandSender::new("console", Duration::from_secs(2));
    let report = sender
        .send(
            &Envelope::Command(Command::new(CommandAction::StopAll)),
            &[a.addr, dead, b.addr],
        )
        .await;
    assert_eq!(report.status, DeliveryStatus::Partial);
    assert_eq!(report.delivered_count(), 2);

    for events in [&mut events_a, &mut events_b] {
        next_event(events, |e| matches!(e, LinkEvent::CommandReceived { .. })).await;
    }
    assert_eq!(a.unit.motors(), MotorTargets::default());

    a.stop().await;
    b.stop().await;
}
