//! Per-container metric lifecycle.
//!
//! A [`ContainerMetric`] moves through `Uninitialized → Active → Stopped`:
//!
//! - [`ContainerMetric::init`] opens the container process' `net/dev` handle
//!   and takes the baseline snapshot.
//! - [`ContainerMetric::sample`] runs one sampling cycle: liveness check,
//!   bounded fetch, rate computation against the baseline, delivery to the
//!   sink, and baseline advance.
//! - [`ContainerMetric::stop`] releases the handle and fires the stop signal.
//!
//! A container whose process disappeared is torn down and removed from its
//! [`ContainerRegistry`]; this is reported as [`SampleError::ContainerGone`].

mod cycle;
mod handle;
mod lifecycle;
mod registry;

pub use handle::ProcessHandle;
pub use lifecycle::{ContainerMetric, InitOutcome, LifecycleStatus};
pub use registry::{ContainerRegistry, Monitor};

use std::time::Duration;

use crate::container::ContainerID;
use crate::fsutil::FileOpenError;
use crate::rate::RateError;
use crate::sink::SinkError;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("container {0} is gone")]
    ContainerGone(ContainerID),
    #[error("no stats available for container {0}")]
    StatsUnavailable(ContainerID),
    #[error("stats for container {container_id} timed out after {after:?}")]
    StatsTimeout {
        container_id: ContainerID,
        after: Duration,
    },
    #[error(transparent)]
    InvalidWindow(#[from] RateError),
    #[error("failed to deliver metrics: {0}")]
    SinkDelivery(#[source] SinkError),
    #[error(transparent)]
    Open(#[from] FileOpenError),
    #[error("failed reading process handle: {0}")]
    Handle(#[source] std::io::Error),
    #[error("container metric is not active")]
    NotActive,
    #[error("container metric is already initialized")]
    AlreadyInitialized,
}

impl SampleError {
    /// The container is gone for good; sampling must not continue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SampleError::ContainerGone(_))
    }

    /// The next tick may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SampleError::StatsUnavailable(_) | SampleError::StatsTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SampleError>;
