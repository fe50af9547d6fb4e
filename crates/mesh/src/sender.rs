//! Outbound command delivery
//!
//! A [`CommandSender`] pushes one envelope to any number of targets
//! concurrently. Each target gets its own short-lived task that connects,
//! identifies, writes and closes, all under one delivery timeout. Results are
//! aggregated into a [`SendReport`].

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use swarmlink_core::codec;
use swarmlink_core::envelope::{Envelope, MessageKind};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::error::{MeshError, MeshResult};

/// Delivery result for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetOutcome {
    /// Envelope written and connection closed cleanly
    Delivered,
    /// Connection or write failed
    Failed(String),
    /// Delivery did not finish within the timeout
    TimedOut,
}

/// Per-target entry of a [`SendReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResult {
    /// Target address
    pub target: SocketAddr,
    /// What happened
    pub outcome: TargetOutcome,
    /// Time spent on this target
    pub elapsed_ms: u64,
}

/// Aggregate delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Every target received the envelope
    AllDelivered,
    /// Some targets received it
    Partial,
    /// No target received it
    AllFailed,
    /// There was nobody to send to
    NoTargets,
}

/// Outcome of one [`CommandSender::send`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReport {
    /// Kind of the envelope sent
    pub kind: MessageKind,
    /// One entry per target, in the order given
    pub results: Vec<TargetResult>,
    /// Aggregate status
    pub status: DeliveryStatus,
}

impl SendReport {
    fn from_results(kind: MessageKind, results: Vec<TargetResult>) -> Self {
        let delivered = results
            .iter()
            .filter(|r| r.outcome == TargetOutcome::Delivered)
            .count();
        let status = if results.is_empty() {
            DeliveryStatus::NoTargets
        } else if delivered == results.len() {
            DeliveryStatus::AllDelivered
        } else if delivered == 0 {
            DeliveryStatus::AllFailed
        } else {
            DeliveryStatus::Partial
        };
        Self {
            kind,
            results,
            status,
        }
    }

    /// Targets that received the envelope
    pub fn delivered_count(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Delivered))
    }

    /// Targets whose delivery failed outright
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Failed(_)))
    }

    /// Targets that hit the timeout
    pub fn timed_out_count(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::TimedOut))
    }

    fn count(&self, pred: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Transient outbound connector
#[derive(Debug, Clone)]
pub struct CommandSender {
    sender_name: String,
    timeout: Duration,
    max_frame_len: usize,
}

impl CommandSender {
    /// Sender identifying itself as `sender_name`, bounding each delivery by `timeout`
    pub fn new(sender_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            sender_name: sender_name.into(),
            timeout,
            max_frame_len: codec::DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Override the frame size limit
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Name sent in the identification frame
    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    /// Deliver `envelope` to every target concurrently
    pub async fn send(&self, envelope: &Envelope, targets: &[SocketAddr]) -> SendReport {
        let kind = envelope.kind();
        if targets.is_empty() {
            debug!(kind = %kind, "no targets, nothing sent");
            return SendReport::from_results(kind, Vec::new());
        }

        let frames = codec::encode_handshake(&self.sender_name)
            .and_then(|hello| Ok((hello, codec::encode(envelope)?)));
        let (hello, frame) = match frames {
            Ok(frames) => frames,
            Err(e) => {
                error!(kind = %kind, "could not encode command: {}", e);
                let results = targets
                    .iter()
                    .map(|&target| TargetResult {
                        target,
                        outcome: TargetOutcome::Failed(e.to_string()),
                        elapsed_ms: 0,
                    })
                    .collect();
                return SendReport::from_results(kind, results);
            }
        };

        let mut workers = JoinSet::new();
        for (index, &target) in targets.iter().enumerate() {
            let (hello, frame) = (hello.clone(), frame.clone());
            let (timeout, max_frame_len) = (self.timeout, self.max_frame_len);
            workers.spawn(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(
                    timeout,
                    deliver(target, hello, frame, max_frame_len),
                )
                .await
                {
                    Ok(Ok(())) => TargetOutcome::Delivered,
                    Ok(Err(e)) => TargetOutcome::Failed(e.to_string()),
                    Err(_) => TargetOutcome::TimedOut,
                };
                let elapsed_ms = started.elapsed().as_millis() as u64;
                (index, TargetResult { target, outcome, elapsed_ms })
            });
        }

        let mut slots: Vec<Option<TargetResult>> = vec![None; targets.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!("delivery worker aborted: {}", e),
            }
        }

        let results: Vec<TargetResult> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, &target)| {
                slot.unwrap_or(TargetResult {
                    target,
                    outcome: TargetOutcome::Failed("worker aborted".to_string()),
                    elapsed_ms: 0,
                })
            })
            .collect();

        for result in &results {
            if result.outcome != TargetOutcome::Delivered {
                warn!(kind = %kind, target = %result.target, outcome = ?result.outcome, "delivery failed");
            }
        }

        let report = SendReport::from_results(kind, results);
        info!(
            kind = %kind,
            status = ?report.status,
            delivered = report.delivered_count(),
            targets = targets.len(),
            "command sent"
        );
        report
    }

    /// Send `envelope` to one target and wait for its reply.
    ///
    /// Used for queries; the whole exchange is bounded by the delivery
    /// timeout.
    pub async fn request(&self, envelope: &Envelope, target: SocketAddr) -> MeshResult<Envelope> {
        let hello = codec::encode_handshake(&self.sender_name)?;
        let frame = codec::encode(envelope)?;
        let exchange = async {
            let stream = TcpStream::connect(target).await?;
            stream.set_nodelay(true)?;
            let mut framed = Framed::new(stream, codec::frame_codec(self.max_frame_len));
            framed.send(hello).await?;
            framed.send(frame).await?;
            let reply = match framed.next().await {
                Some(frame) => codec::decode(&frame?)?,
                None => {
                    return Err(MeshError::Transport(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "peer closed before replying",
                    )))
                }
            };
            SinkExt::<Bytes>::close(&mut framed).await?;
            Ok::<Envelope, MeshError>(reply)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| MeshError::Timeout(format!("{} to {}", envelope.kind(), target)))?
    }
}

async fn deliver(target: SocketAddr, hello: Bytes, frame: Bytes, max_frame_len: usize) -> MeshResult<()> {
    let stream = TcpStream::connect(target).await?;
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, codec::frame_codec(max_frame_len));
    framed.send(hello).await?;
    framed.send(frame).await?;
    SinkExt::<Bytes>::close(&mut framed).await?;
    Ok(())
}
