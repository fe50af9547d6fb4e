use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use swarmlink_core::broadcast::BroadcastMessage;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MeshResult;

/// Largest beacon accepted
const MAX_DATAGRAM: usize = 64 * 1024;

/// A sequence number this far behind the last one seen means the producer restarted
const RESTART_GAP: u64 = 64;

/// Consumer of decoded beacons
pub trait BeaconSink: Send + Sync {
    /// Called for every fresh beacon from another unit
    fn on_beacon(&self, beacon: &BroadcastMessage, from: SocketAddr);
}

/// UDP listener turning datagrams into [`BroadcastMessage`]s.
///
/// Own beacons, undecodable datagrams and stale or reordered beacons are
/// dropped before reaching the sink.
pub struct BeaconReceiver {
    socket: UdpSocket,
    own_id: String,
    sink: Arc<dyn BeaconSink>,
    last_seq: HashMap<String, u64>,
}

impl BeaconReceiver {
    /// Bind the beacon port
    pub async fn bind(
        addr: SocketAddr,
        own_id: impl Into<String>,
        sink: Arc<dyn BeaconSink>,
    ) -> MeshResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(addr = %socket.local_addr()?, "beacon receiver bound");
        Ok(Self {
            socket,
            own_id: own_id.into(),
            sink,
            last_seq: HashMap::new(),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> MeshResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) -> MeshResult<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, from)) => self.accept(&buf[..len], from),
                Err(e) => warn!("beacon receive failed: {}", e),
            }
        }
    }

    fn accept(&mut self, datagram: &[u8], from: SocketAddr) {
        let beacon = match BroadcastMessage::from_datagram(datagram) {
            Ok(beacon) => beacon,
            Err(e) => {
                debug!(from = %from, "ignoring datagram: {}", e);
                return;
            }
        };
        if beacon.unit_id == self.own_id {
            return;
        }
        if !self.is_fresh(&beacon) {
            debug!(unit = %beacon.unit_id, seq = beacon.seq, "stale beacon dropped");
            return;
        }
        self.sink.on_beacon(&beacon, from);
    }

    fn is_fresh(&mut self, beacon: &BroadcastMessage) -> bool {
        let fresh = match self.last_seq.get(&beacon.unit_id) {
            Some(&last) => beacon.seq > last || last - beacon.seq > RESTART_GAP,
            None => true,
        };
        if fresh {
            self.last_seq.insert(beacon.unit_id.clone(), beacon.seq);
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use swarmlink_core::broadcast::BroadcastPayload;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(String, u64)>>);

    impl BeaconSink for Collect {
        fn on_beacon(&self, beacon: &BroadcastMessage, _from: SocketAddr) {
            self.0.lock().unwrap().push((beacon.unit_id.clone(), beacon.seq));
        }
    }

    fn beacon(unit_id: &str, seq: u64) -> Vec<u8> {
        BroadcastMessage {
            unit_id: unit_id.into(),
            address: None,
            seq,
            payload: BroadcastPayload::Heartbeat {
                status: "Idle".into(),
                active_behavior: None,
                uptime_secs: 0.0,
            },
        }
        .to_datagram()
        .unwrap()
    }

    #[tokio::test]
    async fn test_filters_own_stale_and_garbage() {
        let sink = Arc::new(Collect::default());
        let receiver = BeaconReceiver::bind("127.0.0.1:0".parse().unwrap(), "console", sink.clone())
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(receiver.run(shutdown.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for datagram in [
            beacon("drone-1", 1),
            beacon("console", 9),
            b"not a beacon".to_vec(),
            beacon("drone-1", 1),
            beacon("drone-1", 2),
            beacon("drone-2", 1),
        ] {
            sender.send_to(&datagram, addr).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.0.lock().unwrap().len() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![
                ("drone-1".to_string(), 1),
                ("drone-1".to_string(), 2),
                ("drone-2".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_producer_restart_is_accepted() {
        let sink = Arc::new(Collect::default());
        let mut receiver =
            BeaconReceiver::bind("127.0.0.1:0".parse().unwrap(), "console", sink.clone())
                .await
                .unwrap();
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();
        receiver.accept(&beacon("drone-1", 500), from);
        receiver.accept(&beacon("drone-1", 499), from);
        receiver.accept(&beacon("drone-1", 1), from);
        assert_eq!(sink.0.lock().unwrap().len(), 2);
    }
}
