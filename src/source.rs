//! The collaborator delivering raw container statistics.
//!
//! A [`StatsSource`] answers one [`StatsRequest`] by pushing at most one
//! [`RawStats`] into the request's channel. Returning without sending (or
//! dropping the sender on error) tells the caller that no data is available.
//! The caller may give up on a request at any time; it then fires the
//! abandon signal and drops the receiving end, so a late value is discarded.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::container::ContainerID;
use crate::stats::RawStats;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("unknown container `{0}`")]
    UnknownContainer(ContainerID),
    #[error("stats request timed out after {0:?}")]
    Timeout(Duration),
    #[error("stats request abandoned by caller")]
    Abandoned,
    #[error(transparent)]
    Open(#[from] crate::fsutil::FileOpenError),
    #[error("failed reading stats: {0}")]
    Io(#[from] std::io::Error),
    #[error("stats worker failed: {0}")]
    Worker(#[source] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// One request for a single snapshot of a container's counters.
#[derive(Debug)]
pub struct StatsRequest {
    pub container_id: ContainerID,
    /// Time the source may spend producing the snapshot.
    pub timeout: Duration,
    pub stats_tx: mpsc::Sender<RawStats>,
    /// Resolves when the caller is no longer interested in the result.
    pub abandon_rx: oneshot::Receiver<()>,
}

impl StatsRequest {
    /// Creates a request together with the caller's ends of its channels.
    pub fn new(
        container_id: ContainerID,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<RawStats>, oneshot::Sender<()>) {
        let (stats_tx, stats_rx) = mpsc::channel(1);
        let (abandon_tx, abandon_rx) = oneshot::channel();
        (
            Self {
                container_id,
                timeout,
                stats_tx,
                abandon_rx,
            },
            stats_rx,
            abandon_tx,
        )
    }

    /// Delivers `stats` unless the caller went away.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Abandoned`] if the receiving end was dropped.
    pub async fn deliver(&self, stats: RawStats) -> Result<()> {
        self.stats_tx
            .send(stats)
            .await
            .map_err(|_| SourceError::Abandoned)
    }
}

/// Produces raw statistics for a container on request.
pub trait StatsSource: Send + Sync + 'static {
    fn stats(&self, request: StatsRequest) -> impl std::future::Future<Output = Result<()>> + Send;
}
