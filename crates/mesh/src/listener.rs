//! Inbound connection listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::error::MeshResult;
use crate::handler::{ConnectionHandler, ConnectionSettings};
use crate::registry::ConnectionRegistry;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) cannot spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop spawning one [`ConnectionHandler`] per peer
pub struct ConnectionListener {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
}

impl ConnectionListener {
    /// Bind the listening socket.
    ///
    /// Accepted connections are tracked in `registry`, which providers may
    /// already hold (e.g. to report the connection count).
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<Dispatcher>,
        settings: ConnectionSettings,
    ) -> MeshResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "command listener bound");
        Ok(Self {
            listener,
            registry,
            dispatcher,
            settings,
            shutdown: CancellationToken::new(),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> MeshResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Registry of the connections accepted by this listener
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Token that stops the accept loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shut down, then close every live connection
    pub async fn run(self) -> MeshResult<()> {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, remote)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %remote, "set_nodelay failed: {}", e);
                    }
                    let (handle, outbound) = self.registry.register(remote);
                    let handler = ConnectionHandler::new(
                        handle,
                        outbound,
                        Arc::clone(&self.dispatcher),
                        self.settings,
                    );
                    debug!(peer = %remote, active = self.registry.count(), "connection accepted");
                    tokio::spawn(async move {
                        // failures are already logged by the handler
                        let _ = handler.run(stream).await;
                    });
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        let closed = self.registry.close_all();
        warn!(closed, "listener stopped, live connections closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::dispatch::tests::RecordingTrigger;
    use crate::events::{EventBus, LinkEvent};
    use futures_util::SinkExt;
    use swarmlink_core::codec;
    use swarmlink_core::provider::ProviderChain;
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    #[tokio::test]
    async fn test_shutdown_closes_live_connections() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let dispatcher = Arc::new(Dispatcher::new(
            ProviderChain::new(),
            Arc::new(RecordingTrigger::default()),
            Binding::unbound(),
            events,
        ));
        let listener = ConnectionListener::bind(
            "127.0.0.1:0".parse().unwrap(),
            ConnectionRegistry::new(),
            dispatcher,
            ConnectionSettings::default(),
        )
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = listener.registry();
        let shutdown = listener.shutdown_token();
        let task = tokio::spawn(listener.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = Framed::new(stream, codec::frame_codec(codec::DEFAULT_MAX_FRAME_LEN));
        client.send(codec::encode_handshake("console").unwrap()).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), LinkEvent::PeerConnected { .. }));
        assert_eq!(registry.count(), 1);

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(registry.count(), 0);
        assert!(matches!(rx.recv().await.unwrap(), LinkEvent::PeerDisconnected { .. }));
    }
}
