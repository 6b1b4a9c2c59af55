//! A [`StatsSource`] backed by the cgroup v2 filesystem.
//!
//! Each container is registered with the directory of its cgroup, e.g.
//! `/sys/fs/cgroup/system.slice/docker-<id>.scope`. A request reads
//!
//! - `cpu.stat` for CPU time (converted from microseconds to nanoseconds),
//! - `memory.current` and, if present, `memory.peak` for usage and max usage,
//! - `memory.stat` for the anonymous memory reported as RSS.
//!
//! Network counters are not part of a cgroup; they come from the container
//! process' `net/dev` instead.
//!
//! # Platform Requirements
//!
//! - Linux with cgroup v2 support.
//! - Read access to the cgroup directories of the monitored containers.
pub mod stats;

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::container::ContainerID;
use crate::fsutil;
use crate::source::{Result, SourceError, StatsRequest, StatsSource};
use crate::stats::{MemoryUsage, RawStats};
use stats::{CpuStat, KeyValueStat, MemoryCurrent, MemoryStat, SingleLineStat};

/// Reads container statistics from cgroup v2 stat files.
#[derive(Debug, Default)]
pub struct CgroupStatsSource {
    cgroups: DashMap<ContainerID, PathBuf>,
}

impl CgroupStatsSource {
    /// Associates a container with its cgroup directory.
    pub fn register_container(&self, container_id: ContainerID, cgroup_dir: impl Into<PathBuf>) {
        self.cgroups.insert(container_id, cgroup_dir.into());
    }

    pub fn remove_container(&self, container_id: &ContainerID) {
        self.cgroups.remove(container_id);
    }
}

fn read_cgroup_stats(dir: &Path) -> Result<RawStats> {
    let cpu = CpuStat::from_reader(&mut fsutil::open_file_reader(dir.join("cpu.stat"))?)?;
    let current =
        MemoryCurrent::from_reader(&mut fsutil::open_file_reader(dir.join("memory.current"))?)?;
    let peak = match fsutil::open_file_reader(dir.join("memory.peak")) {
        Ok(mut reader) => MemoryCurrent::from_reader(&mut reader)?.bytes,
        // memory.peak only exists since Linux 5.19
        Err(err) if err.is_not_found() => current.bytes,
        Err(err) => return Err(err.into()),
    };
    let memory_stat =
        MemoryStat::from_reader(&mut fsutil::open_file_reader(dir.join("memory.stat"))?)?;

    Ok(RawStats {
        cpu: cpu.to_cpu_usage(),
        memory: MemoryUsage {
            usage: current.bytes,
            max_usage: peak.max(current.bytes),
            rss: memory_stat.anon,
        },
        networks: Default::default(),
    })
}

impl StatsSource for CgroupStatsSource {
    async fn stats(&self, mut request: StatsRequest) -> Result<()> {
        let dir = self
            .cgroups
            .get(&request.container_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SourceError::UnknownContainer(request.container_id.clone()))?;
        log::trace!("reading cgroup stats from `{}`", dir.display());

        let read = tokio::task::spawn_blocking(move || read_cgroup_stats(&dir));
        let stats = tokio::select! {
            biased;
            _ = &mut request.abandon_rx => return Err(SourceError::Abandoned),
            res = tokio::time::timeout(request.timeout, read) => match res {
                Ok(joined) => joined.map_err(SourceError::Worker)??,
                Err(_) => return Err(SourceError::Timeout(request.timeout)),
            },
        };

        request.deliver(stats).await
    }
}
