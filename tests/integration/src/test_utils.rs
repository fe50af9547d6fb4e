//! Test utilities for loopback integration tests

use futures_util::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use swarmlink_core::codec;
use swarmlink_mesh::{
    Binding, BoundTarget, ConnectionListener, ConnectionRegistry, ConnectionSettings, Dispatcher,
    EventBus, LinkEvent, MeshResult,
};
use swarmlink_unit_status::{unit_chain, LocalUnit, LogSink};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

/// Behaviors offered by every test unit
pub const TEST_BEHAVIORS: [&str; 2] = ["Wander", "GoTo"];

/// A unit daemon serving on a loopback port
pub struct TestUnit {
    pub unit: Arc<LocalUnit>,
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    pub events: EventBus,
    shutdown: CancellationToken,
    task: JoinHandle<MeshResult<()>>,
}

impl TestUnit {
    /// Start unit `unit_id` on an ephemeral port
    pub async fn spawn(unit_id: &str) -> Self {
        let unit = Arc::new(LocalUnit::new(
            unit_id,
            TEST_BEHAVIORS.iter().map(|b| b.to_string()).collect(),
        ));
        let binding = Binding::fixed(BoundTarget::new(unit_id, "127.0.0.1"));
        let registry = ConnectionRegistry::new();
        let events = EventBus::default();
        let chain = unit_chain(
            Arc::clone(&unit),
            Arc::clone(&registry),
            binding.clone(),
            None,
            LogSink::tracing_only(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            chain,
            unit.clone(),
            binding,
            events.clone(),
        ));

        let listener = ConnectionListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::clone(&registry),
            dispatcher,
            ConnectionSettings::default(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = listener.shutdown_token();
        let task = tokio::spawn(listener.run());

        Self {
            unit,
            addr,
            registry,
            events,
            shutdown,
            task,
        }
    }

    /// Stop the listener and close every connection
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.task.await.unwrap().unwrap();
    }
}

/// Open a client connection and identify as `name`
pub async fn connect(addr: SocketAddr, name: &str) -> Framed<TcpStream, LengthDelimitedCodec> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, codec::frame_codec(codec::DEFAULT_MAX_FRAME_LEN));
    framed.send(codec::encode_handshake(name).unwrap()).await.unwrap();
    framed
}

/// Address nothing listens on
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Next event matching `wanted`, skipping the rest
pub async fn next_event(
    rx: &mut broadcast::Receiver<LinkEvent>,
    wanted: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
