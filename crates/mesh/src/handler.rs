//! Per-connection worker
//!
//! One [`ConnectionHandler`] owns one socket for its whole life: it reads the
//! identification frame, then serves envelopes until the peer leaves, the
//! stream breaks, or the connection handle is closed. Replies and queued
//! broadcasts are written by the same task, so writes never interleave.

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use swarmlink_core::codec;
use swarmlink_core::config::NetworkConfig;
use swarmlink_core::envelope::Envelope;
use swarmlink_core::DEFAULT_MAX_FRAME_LEN;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec, LengthDelimitedCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, PeerContext};
use crate::error::{MeshError, MeshResult};
use crate::events::LinkEvent;
use crate::registry::{ConnectionHandle, ConnectionState};

/// Limits applied to every inbound connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Window for the identification frame
    pub handshake_timeout: Duration,
    /// Largest accepted frame body
    pub max_frame_len: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl From<&NetworkConfig> for ConnectionSettings {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout(),
            max_frame_len: config.max_frame_len,
        }
    }
}

enum Step {
    Shutdown,
    Inbound(Option<std::io::Result<BytesMut>>),
    Outbound(Envelope),
}

/// Worker serving one peer connection
pub struct ConnectionHandler {
    handle: Arc<ConnectionHandle>,
    outbound: mpsc::Receiver<Envelope>,
    dispatcher: Arc<Dispatcher>,
    settings: ConnectionSettings,
}

impl ConnectionHandler {
    /// Create a worker for a registered connection
    pub fn new(
        handle: Arc<ConnectionHandle>,
        outbound: mpsc::Receiver<Envelope>,
        dispatcher: Arc<Dispatcher>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            handle,
            outbound,
            dispatcher,
            settings,
        }
    }

    /// Serve the connection until it ends, then close and deregister it.
    ///
    /// The returned error, if any, concerns this connection only.
    pub async fn run<S>(mut self, stream: S) -> MeshResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.serve(stream).await;

        self.handle.close();
        self.handle.set_state(ConnectionState::Closed);
        self.dispatcher.events().publish(LinkEvent::PeerDisconnected {
            id: self.handle.id(),
            address: self.handle.remote_addr(),
            name: self.handle.peer_name(),
        });

        match &result {
            Ok(()) => info!(peer = %self.handle.remote_addr(), "connection finished"),
            Err(e) => warn!(peer = %self.handle.remote_addr(), "connection terminated: {}", e),
        }
        result
    }

    async fn serve<S>(&mut self, stream: S) -> MeshResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, codec::frame_codec(self.settings.max_frame_len));
        let token = self.handle.cancellation();

        self.handle.set_state(ConnectionState::Handshaking);
        let name = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            name = self.handshake(&mut framed) => name?,
        };
        self.handle.set_peer_name(name.clone());
        self.handle.set_state(ConnectionState::Serving);
        info!(peer = %self.handle.remote_addr(), name = %name, "peer identified");
        self.dispatcher.events().publish(LinkEvent::PeerConnected {
            id: self.handle.id(),
            address: self.handle.remote_addr(),
            name: name.clone(),
        });

        let peer = PeerContext {
            id: self.handle.id(),
            address: self.handle.remote_addr(),
            name,
        };

        loop {
            let step = tokio::select! {
                _ = token.cancelled() => Step::Shutdown,
                frame = framed.next() => Step::Inbound(frame),
                Some(envelope) = self.outbound.recv() => Step::Outbound(envelope),
            };

            match step {
                Step::Shutdown => {
                    debug!(peer = %peer.name, "shutdown requested");
                    return Ok(());
                }
                Step::Inbound(None) => return Ok(()),
                Step::Inbound(Some(Err(e))) => return Err(classify_read_error(e)),
                Step::Inbound(Some(Ok(frame))) => {
                    if let Some(reply) = self.handle_frame(&peer, &frame) {
                        if !write_envelope(&mut framed, &reply, &token).await? {
                            debug!(peer = %peer.name, "closed while writing reply");
                            return Ok(());
                        }
                    }
                }
                Step::Outbound(envelope) => {
                    if !write_envelope(&mut framed, &envelope, &token).await? {
                        debug!(peer = %peer.name, "closed while writing broadcast");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handshake<S>(&self, framed: &mut Framed<S, LengthDelimitedCodec>) -> MeshResult<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = self.handle.remote_addr();
        let failure = |reason: String| MeshError::Handshake { peer, reason };

        match tokio::time::timeout(self.settings.handshake_timeout, framed.next()).await {
            Err(_) => Err(failure(format!(
                "no identification within {:?}",
                self.settings.handshake_timeout
            ))),
            Ok(None) => Err(failure("closed before identifying".to_string())),
            Ok(Some(Err(e))) => Err(failure(e.to_string())),
            Ok(Some(Ok(frame))) => codec::decode_handshake(&frame).map_err(|e| failure(e.to_string())),
        }
    }

    fn handle_frame(&self, peer: &PeerContext, frame: &[u8]) -> Option<Envelope> {
        match codec::decode(frame) {
            Ok(envelope) => self.dispatcher.dispatch(peer, envelope),
            Err(e) => {
                warn!(peer = %peer.name, "skipping frame: {}", e);
                None
            }
        }
    }
}

/// Write one envelope, giving up if the connection is closed meanwhile.
///
/// Returns `false` if the connection was closed before the frame went out.
async fn write_envelope<S>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    envelope: &Envelope,
    token: &CancellationToken,
) -> MeshResult<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame: Bytes = codec::encode(envelope)?;
    tokio::select! {
        _ = token.cancelled() => Ok(false),
        sent = framed.send(frame) => {
            sent?;
            Ok(true)
        }
    }
}

/// An oversized length prefix means the stream can no longer be framed
fn classify_read_error(e: std::io::Error) -> MeshError {
    let desync = e
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if desync {
        MeshError::Desync(e.to_string())
    } else {
        MeshError::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Binding, BoundTarget};
    use crate::dispatch::tests::RecordingTrigger;
    use crate::events::EventBus;
    use crate::registry::ConnectionRegistry;
    use swarmlink_core::envelope::{LogMessage, MessageKind, StatusRequest};
    use swarmlink_core::provider::{MessageProvider, ProviderChain};
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    struct StatusOk;

    impl MessageProvider for StatusOk {
        fn name(&self) -> &str {
            "status"
        }

        fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
            matches!(request, Envelope::StatusRequest(_)).then(|| Envelope::ack(MessageKind::StatusRequest))
        }
    }

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        handle: Arc<ConnectionHandle>,
        client: Framed<DuplexStream, LengthDelimitedCodec>,
        worker: tokio::task::JoinHandle<MeshResult<()>>,
    }

    /// Answers status queries with a reply far larger than a small pipe
    struct Verbose;

    impl MessageProvider for Verbose {
        fn name(&self) -> &str {
            "verbose"
        }

        fn try_answer(&self, request: &Envelope) -> Option<Envelope> {
            matches!(request, Envelope::StatusRequest(_))
                .then(|| Envelope::rejected(None, "x".repeat(4096)))
        }
    }

    fn start(settings: ConnectionSettings) -> Harness {
        start_with(settings, Arc::new(StatusOk), 64 * 1024)
    }

    fn start_with(
        settings: ConnectionSettings,
        provider: Arc<dyn MessageProvider>,
        pipe_capacity: usize,
    ) -> Harness {
        let registry = ConnectionRegistry::new();
        let (handle, outbound) = registry.register("127.0.0.1:4000".parse().unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
            ProviderChain::new().with(provider),
            Arc::new(RecordingTrigger::default()),
            Binding::fixed(BoundTarget::new("A", "127.0.0.1")),
            EventBus::default(),
        ));
        let (client, server) = duplex(pipe_capacity);
        let worker = tokio::spawn(
            ConnectionHandler::new(handle.clone(), outbound, dispatcher, settings).run(server),
        );
        Harness {
            registry,
            handle,
            client: Framed::new(client, codec::frame_codec(settings.max_frame_len)),
            worker,
        }
    }

    async fn send(client: &mut Framed<DuplexStream, LengthDelimitedCodec>, envelope: &Envelope) {
        client.send(codec::encode(envelope).unwrap()).await.unwrap();
    }

    async fn recv(client: &mut Framed<DuplexStream, LengthDelimitedCodec>) -> Envelope {
        let frame = client.next().await.unwrap().unwrap();
        codec::decode(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_bad_frame_is_skipped() {
        let mut h = start(ConnectionSettings::default());
        h.client.send(codec::encode_handshake("console").unwrap()).await.unwrap();

        h.client
            .send(Bytes::from_static(br#"{"type":"warp_drive","payload":{}}"#))
            .await
            .unwrap();
        send(&mut h.client, &Envelope::StatusRequest(StatusRequest {})).await;

        assert_eq!(recv(&mut h.client).await, Envelope::ack(MessageKind::StatusRequest));
        assert_eq!(h.handle.peer_name().as_deref(), Some("console"));
        assert_eq!(h.handle.state(), ConnectionState::Serving);
    }

    #[tokio::test]
    async fn test_unanswered_query_gets_rejection() {
        let mut h = start(ConnectionSettings::default());
        h.client.send(codec::encode_handshake("console").unwrap()).await.unwrap();
        send(
            &mut h.client,
            &Envelope::Log(LogMessage {
                message: "hi".into(),
                stamp: None,
            }),
        )
        .await;
        assert!(matches!(recv(&mut h.client).await, Envelope::Rejected(_)));
    }

    #[tokio::test]
    async fn test_handshake_timeout_closes_connection() {
        let h = start(ConnectionSettings {
            handshake_timeout: Duration::from_millis(50),
            ..ConnectionSettings::default()
        });
        let result = h.worker.await.unwrap();
        assert!(matches!(result, Err(MeshError::Handshake { .. })));
        assert_eq!(h.registry.count(), 0);
        assert_eq!(h.handle.state(), ConnectionState::Closed);
        drop(h.client);
    }

    #[tokio::test]
    async fn test_oversized_prefix_is_fatal() {
        let mut h = start(ConnectionSettings {
            max_frame_len: 128,
            ..ConnectionSettings::default()
        });
        h.client.send(codec::encode_handshake("console").unwrap()).await.unwrap();
        let raw = h.client.get_mut();
        raw.write_all(&10_000u32.to_be_bytes()).await.unwrap();
        raw.flush().await.unwrap();

        let result = h.worker.await.unwrap();
        assert!(matches!(result, Err(MeshError::Desync(_))));
        assert_eq!(h.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_external_close_stops_worker() {
        let mut h = start(ConnectionSettings::default());
        h.client.send(codec::encode_handshake("console").unwrap()).await.unwrap();
        send(&mut h.client, &Envelope::StatusRequest(StatusRequest {})).await;
        recv(&mut h.client).await;

        assert!(h.registry.remove(&h.handle));
        assert!(h.worker.await.unwrap().is_ok());
        assert!(!h.handle.close());
        assert_eq!(h.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_worker_blocked_on_write() {
        let mut h = start_with(ConnectionSettings::default(), Arc::new(Verbose), 1024);
        h.client.send(codec::encode_handshake("console").unwrap()).await.unwrap();
        send(&mut h.client, &Envelope::StatusRequest(StatusRequest {})).await;

        // the client never reads, so the reply fills the pipe
        let handle = h.handle.clone();
        assert!(eventually_state(&handle, ConnectionState::Serving).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.worker.is_finished());

        assert!(h.handle.close());
        let finished = tokio::time::timeout(Duration::from_secs(2), h.worker).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));
        assert_eq!(h.registry.count(), 0);
        assert_eq!(h.handle.state(), ConnectionState::Closed);
        drop(h.client);
    }

    async fn eventually_state(handle: &ConnectionHandle, state: ConnectionState) -> bool {
        for _ in 0..100 {
            if handle.state() == state {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_queued_broadcast_is_written() {
        let mut h = start(ConnectionSettings::default());
        h.client.send(codec::encode_handshake("console").unwrap()).await.unwrap();
        // round trip so the worker is known to be serving
        send(&mut h.client, &Envelope::StatusRequest(StatusRequest {})).await;
        recv(&mut h.client).await;

        let summary = h.registry.broadcast_to_all(&Envelope::ack(MessageKind::Log));
        assert_eq!(summary.queued, 1);
        assert_eq!(recv(&mut h.client).await, Envelope::ack(MessageKind::Log));
    }
}
