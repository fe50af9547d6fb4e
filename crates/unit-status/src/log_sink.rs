//! Log sink
//!
//! `log` messages from peers are always traced; when a file is configured
//! they are also appended to it by a background task. Producers never wait:
//! the channel to the writer is bounded and a full channel drops the line.

use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lines that may wait for the writer
pub const DEFAULT_SINK_CAPACITY: usize = 1024;

/// Log sink failures
#[derive(Debug, Error)]
pub enum LogSinkError {
    /// The log file could not be opened
    #[error("Failed to open log file {path}: {source}")]
    Open {
        /// Configured path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
}

/// One persisted line
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    /// RFC 3339 UTC timestamp
    pub at: String,
    /// Stamp grouping related lines
    pub stamp: Option<String>,
    /// Log text
    pub message: String,
}

impl LogLine {
    fn render(&self) -> String {
        match &self.stamp {
            Some(stamp) => format!("{} [{}] {}\n", self.at, stamp, self.message),
            None => format!("{} {}\n", self.at, self.message),
        }
    }
}

/// Cheaply cloneable handle to the log sink
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    tx: Option<mpsc::Sender<LogLine>>,
    stamp: Arc<RwLock<Option<String>>>,
}

impl LogSink {
    /// Sink that only traces
    pub fn tracing_only() -> Self {
        Self::default()
    }

    /// Open (or create) `path` for appending and start the writer task
    pub async fn open(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<(Self, JoinHandle<()>), LogSinkError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LogSinkError::Open {
                path: path.clone(),
                source,
            })?;

        let (tx, mut rx) = mpsc::channel::<LogLine>(capacity.max(1));
        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let result = async {
                    file.write_all(line.render().as_bytes()).await?;
                    file.flush().await
                }
                .await;
                if let Err(e) = result {
                    warn!(path = %path.display(), "log write failed: {}", e);
                }
            }
        });

        Ok((
            Self {
                tx: Some(tx),
                stamp: Arc::default(),
            },
            writer,
        ))
    }

    /// Set the stamp used for lines that carry none
    pub fn set_stamp(&self, stamp: impl Into<String>) {
        *self.stamp.write().unwrap_or_else(PoisonError::into_inner) = Some(stamp.into());
    }

    /// Current default stamp
    pub fn stamp(&self) -> Option<String> {
        self.stamp
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a line; returns `false` if it could not be queued for the file
    pub fn record(&self, message: &str, stamp: Option<&str>) -> bool {
        let stamp = stamp.map(str::to_string).or_else(|| self.stamp());
        info!(target: "swarmlink::log", stamp = ?stamp, "{}", message);

        let Some(tx) = &self.tx else {
            return true;
        };
        let line = LogLine {
            at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            stamp,
            message: message.to_string(),
        };
        match tx.try_send(line) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("log sink full, line dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("log sink writer stopped, line dropped");
                false
            }
        }
    }

    /// Stop accepting lines; the writer drains what is queued and exits
    pub fn close(&mut self) {
        self.tx = None;
    }
}
