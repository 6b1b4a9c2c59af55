//! Fixed-interval driver for one container's lifecycle.
//!
//! The loop ticks every `step`, runs one sampling cycle per tick and decides
//! when to give up:
//!
//! - the container is gone → stop,
//! - too many consecutive fetch timeouts or empty fetches → stop,
//! - sink and other errors are logged and sampling continues,
//! - the shutdown signal fires → stop.

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::container::{ContainerID, Pid};
use crate::metric::{
    ContainerMetric, ContainerRegistry, InitOutcome, LifecycleStatus, Result, SampleError,
};
use crate::sink::MetricSink;
use crate::source::StatsSource;

/// How many transient failures in a row are tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_consecutive_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
        }
    }
}

/// Why [`run_container`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The container process exited.
    ContainerGone,
    /// Fetches kept timing out or coming back empty.
    RetriesExhausted,
    /// The shutdown signal fired.
    Shutdown,
    /// The lifecycle was never initialised or has been stopped.
    Stopped,
}

/// Initialises `metric`, retrying transient fetch failures once per step.
///
/// # Errors
///
/// Returns the last error once the policy is exhausted, or any non-transient
/// error right away.
pub async fn init_with_retry<S, K, R>(
    metric: &mut ContainerMetric<S, K, R>,
    container_id: ContainerID,
    pid: Pid,
    policy: RetryPolicy,
) -> Result<InitOutcome>
where
    S: StatsSource,
    K: MetricSink,
    R: ContainerRegistry,
{
    let mut attempt = 1;
    loop {
        match metric.init(container_id.clone(), pid).await {
            Err(err) if err.is_transient() && attempt < policy.max_consecutive_failures => {
                log::warn!(
                    "init of container {} failed (attempt {attempt}): {err}",
                    container_id.short()
                );
                attempt += 1;
                tokio::time::sleep(metric.config().step()).await;
            }
            result => return result,
        }
    }
}

/// Samples `metric` every step until the container goes away, fetches keep
/// failing, or `shutdown` turns `true`.
///
/// An active lifecycle is stopped whenever this returns; an uninitialised one
/// is returned as is.
pub async fn run_container<S, K, R>(
    metric: &mut ContainerMetric<S, K, R>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> PollExit
where
    S: StatsSource,
    K: MetricSink,
    R: ContainerRegistry,
{
    if metric.status() == LifecycleStatus::Uninitialized {
        return PollExit::Stopped;
    }
    let mut stopped = metric.stopped();
    let mut interval = tokio::time::interval(metric.config().step());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the baseline was just taken.
    interval.tick().await;

    let mut failures = 0;
    loop {
        if *stopped.borrow_and_update() {
            return PollExit::Stopped;
        }
        if *shutdown.borrow_and_update() {
            metric.stop();
            return PollExit::Shutdown;
        }

        tokio::select! {
            biased;
            // fires once the lifecycle is stopped; the check above then returns
            _ = stopped.changed() => continue,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // sender gone, nobody can stop us anymore
                    metric.stop();
                    return PollExit::Shutdown;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        match metric.sample().await {
            Ok(rates) => {
                failures = 0;
                log::trace!("sent {} values", rates.len());
            }
            Err(err @ SampleError::ContainerGone(_)) => {
                log::warn!("{err}");
                return PollExit::ContainerGone;
            }
            Err(err) if err.is_transient() => {
                failures += 1;
                log::warn!(
                    "{err} ({failures}/{} consecutive failures)",
                    policy.max_consecutive_failures
                );
                if failures >= policy.max_consecutive_failures {
                    metric.stop();
                    return PollExit::RetriesExhausted;
                }
            }
            Err(err) => log::error!("{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::config::SamplingConfigBuilder;
    use crate::metric::Monitor;
    use crate::metric::testutil::*;

    type TestMetric = ContainerMetric<ScriptedSource, RecordingSink, Monitor>;

    fn id() -> ContainerID {
        ContainerID::new("feedfacecafebeef").unwrap()
    }

    fn pid() -> Pid {
        Pid::new(100).unwrap()
    }

    fn metric(
        proc_root: &std::path::Path,
        replies: Vec<Reply>,
    ) -> (TestMetric, Arc<RecordingSink>, Arc<ScriptedSource>) {
        fake_process(proc_root, 100);
        let source = Arc::new(ScriptedSource::new(replies));
        let sink = Arc::new(RecordingSink::default());
        let config = SamplingConfigBuilder::default()
            .set_fetch_timeout(FETCH_TIMEOUT)
            .set_force_timeout(FORCE_TIMEOUT)
            .set_step(Duration::from_secs(10))
            .set_proc_root(proc_root)
            .build(Arc::clone(&source))
            .unwrap();
        let metric = ContainerMetric::new(
            Arc::new(config),
            Arc::clone(&sink),
            Arc::new(Monitor::default()),
            "host-a",
            "",
        );
        (metric, sink, source)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, sink, _) = metric(tmp.path(), vec![Reply::Stats(raw_stats(1, 1, 1))]);
        metric.init(id(), pid()).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trigger = async {
            tokio::time::sleep(Duration::from_secs(25)).await;
            shutdown_tx.send(true).unwrap();
        };
        let (exit, ()) = tokio::join!(
            run_container(&mut metric, RetryPolicy::default(), shutdown_rx),
            trigger
        );

        assert_eq!(exit, PollExit::Shutdown);
        assert_eq!(sink.sent.lock().unwrap().len(), 2);
        assert_eq!(metric.status(), LifecycleStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_container_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, sink, _) = metric(tmp.path(), vec![Reply::Stats(raw_stats(1, 1, 1))]);
        metric.init(id(), pid()).await.unwrap();
        std::fs::remove_dir_all(tmp.path().join("100")).unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let exit = run_container(&mut metric, RetryPolicy::default(), shutdown_rx).await;

        assert_eq!(exit, PollExit::ContainerGone);
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(metric.status(), LifecycleStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_consecutive_timeouts() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, sink, source) = metric(
            tmp.path(),
            vec![Reply::Stats(raw_stats(1, 1, 1)), Reply::Hang],
        );
        metric.init(id(), pid()).await.unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let exit = run_container(&mut metric, RetryPolicy::default(), shutdown_rx).await;

        assert_eq!(exit, PollExit::RetriesExhausted);
        assert_eq!(metric.status(), LifecycleStatus::Stopped);
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, sink, _) = metric(
            tmp.path(),
            vec![
                Reply::Stats(raw_stats(1, 1, 1)),
                Reply::Empty,
                Reply::Empty,
                Reply::Stats(raw_stats(2, 2, 1)),
                Reply::Empty,
                Reply::Empty,
                Reply::Empty,
            ],
        );
        metric.init(id(), pid()).await.unwrap();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let exit = run_container(&mut metric, RetryPolicy::default(), shutdown_rx).await;

        assert_eq!(exit, PollExit::RetriesExhausted);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_errors_do_not_stop_sampling() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, sink, _) = metric(tmp.path(), vec![Reply::Stats(raw_stats(1, 1, 1))]);
        metric.init(id(), pid()).await.unwrap();
        sink.fail.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trigger = async {
            tokio::time::sleep(Duration::from_secs(35)).await;
            sink.fail.store(false, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            shutdown_tx.send(true).unwrap();
        };
        let (exit, ()) = tokio::join!(
            run_container(&mut metric, RetryPolicy::default(), shutdown_rx),
            trigger
        );

        assert_eq!(exit, PollExit::Shutdown);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_metric_returns_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, _, _) = metric(tmp.path(), vec![Reply::Empty]);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let exit = run_container(&mut metric, RetryPolicy::default(), shutdown_rx).await;
        assert_eq!(exit, PollExit::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_metric_returns_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, sink, source) =
            metric(tmp.path(), vec![Reply::Stats(raw_stats(1, 1, 1))]);
        metric.init(id(), pid()).await.unwrap();
        metric.stop();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let exit = run_container(&mut metric, RetryPolicy::default(), shutdown_rx).await;
        assert_eq!(exit, PollExit::Stopped);
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_with_retry() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, _, source) = metric(
            tmp.path(),
            vec![Reply::Empty, Reply::Empty, Reply::Stats(raw_stats(1, 1, 1))],
        );

        let outcome = init_with_retry(&mut metric, id(), pid(), RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(outcome, InitOutcome::Active);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_with_retry_gives_up() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut metric, _, source) = metric(tmp.path(), vec![Reply::Empty]);

        let err = init_with_retry(&mut metric, id(), pid(), RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SampleError::StatsUnavailable(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metric.status(), LifecycleStatus::Uninitialized);
    }
}
