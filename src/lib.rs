use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{ContainerTarget, SamplingConfigBuilder};
use error::ResultOkLogExt;
use metric::{ContainerMetric, InitOutcome, Monitor};
use poll::{PollExit, RetryPolicy};
use sink::FalconSink;
use tokio::sync::watch;

/// Creo Metrics: a per-container rate sampler.
///
/// Each monitored container is sampled on a fixed step. Cumulative CPU, memory
/// and network counters are read from a [`source::StatsSource`], turned into
/// per-interval rates by [`rate::compute_rates`], and pushed to a
/// [`sink::MetricSink`].
pub mod cgroup;
pub mod config;
pub mod container;
pub mod error;
pub mod fsutil;
pub mod metric;
pub mod poll;
pub mod rate;
pub mod sink;
pub mod source;
pub mod stats;

/// Runs the sampler for the containers listed in `CREO_CONTAINERS`.
///
/// Stats are read from the cgroup v2 filesystem and the rates are written to
/// stdout as open-falcon JSON lines. Every container is sampled by its own
/// task until it exits, its fetches keep failing, or Ctrl-C is received.
/// Returns once every task has finished.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid `CREO_*` environment variables.
/// - An invalid `CREO_CONTAINERS` entry.
/// - Failure to determine the hostname.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let rootfs = std::env::var_os("ROOTFS_MOUNT_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));
    log::debug!("Final rootfs: {}", rootfs.display());

    let targets = config::parse_targets(
        &std::env::var("CREO_CONTAINERS").map_err(|_| "`CREO_CONTAINERS` must be set")?,
    )?;
    if targets.is_empty() {
        log::warn!("no containers to sample");
        return Ok(());
    }

    let hostname = read_hostname(&rootfs)?;
    log::debug!("Hostname: {}", &hostname);

    let source = Arc::new(cgroup::CgroupStatsSource::default());
    let config = Arc::new(SamplingConfigBuilder::from_env()?.build(Arc::clone(&source))?);
    let sink = Arc::new(FalconSink::new(std::io::stdout()));
    let monitor = Arc::new(Monitor::default());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::with_capacity(targets.len());
    for ContainerTarget {
        container_id,
        pid,
        cgroup_dir,
    } in targets
    {
        source.register_container(container_id.clone(), cgroup_dir);
        monitor.register_container(container_id.clone(), pid);

        let mut metric = ContainerMetric::new(
            Arc::clone(&config),
            Arc::clone(&sink),
            Arc::clone(&monitor),
            hostname.clone(),
            format!("container={}", container_id.short()),
        );
        let source = Arc::clone(&source);
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let policy = RetryPolicy::default();
            let outcome = poll::init_with_retry(&mut metric, container_id.clone(), pid, policy)
                .await
                .ok_log();
            if outcome == Some(InitOutcome::Active) {
                let exit = poll::run_container(&mut metric, policy, shutdown).await;
                log::debug!("container {} stopped: {exit:?}", container_id.short());
                if exit != PollExit::Shutdown {
                    log::warn!("stopped sampling container {}", container_id.short());
                }
            }
            metric.stop();
            source.remove_container(&container_id);
        }));
    }
    log::debug!("sampling {} containers", monitor.size());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("shutting down");
                shutdown_tx.send_replace(true);
            }
            Err(err) => {
                log::error!("failed to listen for Ctrl-C: {err}");
                shutdown_tx.closed().await;
            }
        }
    });

    for task in tasks {
        task.await.ok_log();
    }
    log::info!("all containers stopped");

    Ok(())
}

fn read_hostname(rootfs: &Path) -> std::io::Result<String> {
    if let Ok(hostname) = std::env::var("HOSTNAME") {
        return Ok(hostname);
    }
    fsutil::read_trimmed(rootfs.join("etc/hostname"))
        .or_else(|_| fsutil::read_trimmed(rootfs.join("proc/sys/kernel/hostname")))
}
