use std::sync::Arc;

use tokio::time::Instant;

use super::lifecycle::{ContainerMetric, LifecycleState};
use super::registry::ContainerRegistry;
use super::{Result, SampleError};
use crate::config::SamplingConfig;
use crate::container::ContainerID;
use crate::rate::{SampleWindow, compute_rates};
use crate::sink::MetricSink;
use crate::source::{SourceError, StatsRequest, StatsSource};
use crate::stats::{CounterSnapshot, RateSample, RawStats};

/// Fetches one snapshot for `container_id`, giving up after the force timeout.
///
/// The request runs on its own task. If the deadline passes first, the task is
/// told to abandon the request and its eventual result is dropped.
pub(super) async fn fetch_stats<S: StatsSource>(
    config: &SamplingConfig<S>,
    container_id: &ContainerID,
) -> Result<RawStats> {
    let (request, mut stats_rx, abandon_tx) =
        StatsRequest::new(container_id.clone(), config.fetch_timeout());

    let source = Arc::clone(config.source());
    let worker_id = container_id.clone();
    tokio::spawn(async move {
        match source.stats(request).await {
            Ok(()) => {}
            Err(SourceError::Abandoned) => {
                log::debug!("stats request for {} abandoned", worker_id.short());
            }
            Err(err) => {
                log::warn!(
                    "get stats failed: container_id={}, error={}",
                    worker_id.short(),
                    err
                );
            }
        }
    });

    let force_timeout = config.force_timeout();
    tokio::select! {
        stats = stats_rx.recv() => {
            stats.ok_or_else(|| SampleError::StatsUnavailable(container_id.clone()))
        }
        _ = tokio::time::sleep(force_timeout) => {
            // the worker may already be gone
            let _ = abandon_tx.send(());
            Err(SampleError::StatsTimeout {
                container_id: container_id.clone(),
                after: force_timeout,
            })
        }
    }
}

fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl<S, K, R> ContainerMetric<S, K, R>
where
    S: StatsSource,
    K: MetricSink,
    R: ContainerRegistry,
{
    /// Runs one sampling cycle and returns the values handed to the sink.
    ///
    /// The baseline advances after every successful rate computation, even if
    /// the sink then fails. Fetch failures leave the baseline untouched.
    ///
    /// # Errors
    ///
    /// - [`SampleError::NotActive`] unless the lifecycle is active.
    /// - [`SampleError::ContainerGone`] if the process exited; the lifecycle is
    ///   torn down and removed from the registry.
    /// - [`SampleError::StatsUnavailable`] or [`SampleError::StatsTimeout`] if
    ///   no snapshot arrived.
    /// - [`SampleError::Handle`] if `net/dev` cannot be read or is malformed.
    /// - [`SampleError::InvalidWindow`] if no time passed since the last read.
    /// - [`SampleError::SinkDelivery`] if the sink rejected the values.
    pub async fn sample(&mut self) -> Result<RateSample> {
        let LifecycleState::Active(active) = &mut self.state else {
            return Err(SampleError::NotActive);
        };

        if !active.handle.exists() {
            let container_id = active.container_id.clone();
            return Err(self.container_gone(container_id));
        }

        let raw = fetch_stats(&self.config, &active.container_id).await?;
        let interfaces = match active.handle.read_interfaces() {
            Ok(interfaces) => interfaces,
            // the process may have exited while the fetch was in flight
            Err(_) if !active.handle.exists() => {
                let container_id = active.container_id.clone();
                return Err(self.container_gone(container_id));
            }
            Err(err) => return Err(SampleError::Handle(err)),
        };
        let current = CounterSnapshot::from_raw(&raw, &interfaces);

        let now = Instant::now();
        let window = SampleWindow::between(active.last_sample, now)?;
        let rates = compute_rates(
            &current,
            &active.last_snapshot,
            window.elapsed(),
            self.config.classifier(),
        )?;
        active.last_snapshot = current;
        active.last_sample = now;
        log::trace!(
            "container {}: {} values over {:?}",
            active.container_id.short(),
            rates.len(),
            window.elapsed()
        );

        self.sink
            .send(
                &rates,
                &self.endpoint,
                &self.tag,
                unix_timestamp(),
                self.config.step_secs(),
            )
            .await
            .map_err(SampleError::SinkDelivery)?;

        Ok(rates)
    }

    fn container_gone(&mut self, container_id: ContainerID) -> SampleError {
        log::warn!("container id: {} exited.", container_id.short());
        self.teardown(&container_id);
        SampleError::ContainerGone(container_id)
    }
}
