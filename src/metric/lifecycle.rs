use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;

use super::cycle::fetch_stats;
use super::handle::ProcessHandle;
use super::registry::ContainerRegistry;
use super::{Result, SampleError};
use crate::config::SamplingConfig;
use crate::container::{ContainerID, Pid};
use crate::sink::MetricSink;
use crate::source::StatsSource;
use crate::stats::CounterSnapshot;

/// Result of [`ContainerMetric::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The baseline was taken; the container is being sampled.
    Active,
    /// The container process was already gone; the lifecycle is stopped.
    Exited,
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Uninitialized,
    Active,
    Stopped,
}

/// State owned by an active lifecycle.
#[derive(Debug)]
pub(super) struct ActiveState {
    pub(super) container_id: ContainerID,
    pub(super) pid: Pid,
    pub(super) handle: ProcessHandle,
    pub(super) last_snapshot: CounterSnapshot,
    pub(super) last_sample: Instant,
}

#[derive(Debug)]
pub(super) enum LifecycleState {
    Uninitialized,
    Active(ActiveState),
    Stopped,
}

/// Sampling state of a single container.
#[derive(Debug)]
pub struct ContainerMetric<S, K, R> {
    pub(super) config: Arc<SamplingConfig<S>>,
    pub(super) sink: Arc<K>,
    registry: Arc<R>,
    pub(super) endpoint: String,
    pub(super) tag: String,
    pub(super) state: LifecycleState,
    stop_tx: Option<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl<S, K, R> ContainerMetric<S, K, R>
where
    S: StatsSource,
    K: MetricSink,
    R: ContainerRegistry,
{
    /// Creates an uninitialised lifecycle reporting to `sink` as `endpoint` with `tag`.
    pub fn new(
        config: Arc<SamplingConfig<S>>,
        sink: Arc<K>,
        registry: Arc<R>,
        endpoint: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            config,
            sink,
            registry,
            endpoint: endpoint.into(),
            tag: tag.into(),
            state: LifecycleState::Uninitialized,
            stop_tx: Some(stop_tx),
            stop_rx,
        }
    }

    /// Opens the process handle of `container_id` and takes the baseline snapshot.
    ///
    /// If the process no longer exists the container is removed from the
    /// registry, the lifecycle is stopped and [`InitOutcome::Exited`] is returned.
    ///
    /// # Errors
    ///
    /// - [`SampleError::AlreadyInitialized`] unless the lifecycle is uninitialised.
    /// - [`SampleError::Open`] if the handle cannot be opened for another reason.
    /// - Any fetch error of the baseline cycle; the lifecycle then stays
    ///   uninitialised and `init` may be retried.
    pub async fn init(&mut self, container_id: ContainerID, pid: Pid) -> Result<InitOutcome> {
        if !matches!(self.state, LifecycleState::Uninitialized) {
            return Err(SampleError::AlreadyInitialized);
        }

        let mut handle = match ProcessHandle::open(self.config.proc_root(), pid) {
            Ok(handle) => handle,
            Err(err) if err.is_not_found() => {
                log::warn!("container id: {} exited.", container_id.short());
                self.registry.remove_container(&container_id);
                self.stop();
                return Ok(InitOutcome::Exited);
            }
            Err(err) => return Err(err.into()),
        };

        let raw = fetch_stats(&self.config, &container_id).await?;
        let interfaces = handle.read_interfaces().map_err(SampleError::Handle)?;
        let last_snapshot = CounterSnapshot::from_raw(&raw, &interfaces);
        log::debug!(
            "initialized container {} (pid {}) with {} counters",
            container_id.short(),
            pid,
            last_snapshot.len()
        );

        self.state = LifecycleState::Active(ActiveState {
            container_id,
            pid,
            handle,
            last_snapshot,
            last_sample: Instant::now(),
        });
        Ok(InitOutcome::Active)
    }

    /// Stops sampling, releases the process handle and fires the stop signal.
    ///
    /// Calling `stop` more than once has no further effect.
    pub fn stop(&mut self) {
        let previous = std::mem::replace(&mut self.state, LifecycleState::Stopped);
        if let LifecycleState::Active(active) = previous {
            log::debug!(
                "stopping container {} (pid {}), closing `{}`",
                active.container_id.short(),
                active.pid,
                active.handle.path().display()
            );
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            stop_tx.send_replace(true);
        }
    }

    /// Removes the container from the registry and stops the lifecycle.
    pub(super) fn teardown(&mut self, container_id: &ContainerID) {
        self.registry.remove_container(container_id);
        self.stop();
    }

    pub fn status(&self) -> LifecycleStatus {
        match self.state {
            LifecycleState::Uninitialized => LifecycleStatus::Uninitialized,
            LifecycleState::Active(_) => LifecycleStatus::Active,
            LifecycleState::Stopped => LifecycleStatus::Stopped,
        }
    }

    /// The container being sampled, once initialised.
    pub fn container_id(&self) -> Option<&ContainerID> {
        match &self.state {
            LifecycleState::Active(active) => Some(&active.container_id),
            _ => None,
        }
    }

    /// The counters of the last successful read, once initialised.
    pub fn last_snapshot(&self) -> Option<&CounterSnapshot> {
        match &self.state {
            LifecycleState::Active(active) => Some(&active.last_snapshot),
            _ => None,
        }
    }

    /// The instant of the last successful read, once initialised.
    pub fn last_sample(&self) -> Option<Instant> {
        match &self.state {
            LifecycleState::Active(active) => Some(active.last_sample),
            _ => None,
        }
    }

    /// A receiver that turns `true` once the lifecycle is stopped.
    pub fn stopped(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    pub fn config(&self) -> &SamplingConfig<S> {
        &self.config
    }
}
