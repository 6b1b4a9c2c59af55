//! Process-wide sampling settings.
//!
//! A [`SamplingConfig`] is built once, before any container is sampled, and is
//! then shared read-only (behind an [`Arc`]) by every container lifecycle.
//! Settings can be assembled programmatically through [`SamplingConfigBuilder`]
//! or read from the environment with [`SamplingConfigBuilder::from_env`].
//!
//! # Environment
//!
//! | variable                   | meaning                                   | default   |
//! |----------------------------|-------------------------------------------|-----------|
//! | `CREO_FETCH_TIMEOUT_SECS`  | timeout handed to the stats source        | `5`       |
//! | `CREO_FORCE_TIMEOUT_SECS`  | hard deadline after which a fetch is dropped | `10`   |
//! | `CREO_VLAN_PREFIX`         | interface prefix reported as network rate | `eth`     |
//! | `CREO_DEFAULT_VLAN`        | default interface key                     | `eth0`    |
//! | `CREO_STEP_SECS`           | sampling interval reported to the sink    | `60`      |
//! | `ROOTFS_MOUNT_PATH`        | host root; `/proc` is resolved below it   | `/`       |
//! | `CREO_CONTAINERS`          | `<id>:<pid>:<cgroup-dir>` list, see [`parse_targets`] | - |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::container::{self, ContainerID, Pid};
use crate::rate::KeyClassifier;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FORCE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STEP: Duration = Duration::from_secs(60);
const DEFAULT_VLAN_PREFIX: &str = "eth";
const DEFAULT_VLAN: &str = "eth0";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value for `{var}`: `{value}`")]
    InvalidEnvValue { var: &'static str, value: String },
    #[error("fetch timeout must be greater than zero")]
    ZeroFetchTimeout,
    #[error("step interval must be at least one second")]
    ZeroStep,
    #[error("force timeout {force:?} is shorter than fetch timeout {fetch:?}")]
    ForceBeforeFetch { fetch: Duration, force: Duration },
    #[error("invalid container target `{0}`, expected `<id>:<pid>:<cgroup-dir>`")]
    InvalidTarget(String),
    #[error("invalid container target: {0}")]
    Container(#[from] container::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read-only settings shared by all container lifecycles.
#[derive(Debug)]
pub struct SamplingConfig<S> {
    fetch_timeout: Duration,
    force_timeout: Duration,
    step: Duration,
    proc_root: PathBuf,
    classifier: KeyClassifier,
    source: Arc<S>,
}

impl<S> SamplingConfig<S> {
    /// Timeout passed to the stats source with every request.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Deadline after which a pending fetch is abandoned.
    pub fn force_timeout(&self) -> Duration {
        self.force_timeout
    }

    /// Sampling interval.
    pub fn step(&self) -> Duration {
        self.step
    }

    /// The step in whole seconds, as reported to the sink.
    pub fn step_secs(&self) -> i64 {
        self.step.as_secs() as i64
    }

    /// Directory holding the `<pid>/net/dev` files.
    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    pub fn classifier(&self) -> &KeyClassifier {
        &self.classifier
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct SamplingConfigBuilder {
    fetch_timeout: Duration,
    force_timeout: Duration,
    step: Duration,
    proc_root: PathBuf,
    vlan_prefix: String,
    default_vlan: String,
}

impl Default for SamplingConfigBuilder {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            force_timeout: DEFAULT_FORCE_TIMEOUT,
            step: DEFAULT_STEP,
            proc_root: PathBuf::from("/proc"),
            vlan_prefix: DEFAULT_VLAN_PREFIX.to_owned(),
            default_vlan: DEFAULT_VLAN.to_owned(),
        }
    }
}

impl SamplingConfigBuilder {
    /// Creates a builder initialised from the `CREO_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvValue`] if a timeout or step variable is not a
    /// whole number of seconds.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::default();

        if let Some(timeout) = secs_from_env("CREO_FETCH_TIMEOUT_SECS")? {
            builder.set_fetch_timeout(timeout);
        }
        if let Some(timeout) = secs_from_env("CREO_FORCE_TIMEOUT_SECS")? {
            builder.set_force_timeout(timeout);
        }
        if let Some(step) = secs_from_env("CREO_STEP_SECS")? {
            builder.set_step(step);
        }
        if let Ok(prefix) = std::env::var("CREO_VLAN_PREFIX") {
            builder.set_vlan_prefix(prefix);
        }
        if let Ok(vlan) = std::env::var("CREO_DEFAULT_VLAN") {
            builder.set_default_vlan(vlan);
        }
        if let Some(rootfs) = std::env::var_os("ROOTFS_MOUNT_PATH").map(PathBuf::from) {
            builder.set_proc_root(rootfs.join("proc"));
        }

        Ok(builder)
    }

    pub fn set_fetch_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn set_force_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.force_timeout = timeout;
        self
    }

    pub fn set_step(&mut self, step: Duration) -> &mut Self {
        self.step = step;
        self
    }

    pub fn set_proc_root(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.proc_root = path.into();
        self
    }

    pub fn set_vlan_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.vlan_prefix = prefix.into();
        self
    }

    pub fn set_default_vlan(&mut self, vlan: impl Into<String>) -> &mut Self {
        self.default_vlan = vlan.into();
        self
    }

    /// Validates the settings and binds them to a stats source.
    ///
    /// # Errors
    ///
    /// - [`Error::ZeroFetchTimeout`] if the fetch timeout is zero.
    /// - [`Error::ZeroStep`] if the step is shorter than one second.
    /// - [`Error::ForceBeforeFetch`] if the force timeout is shorter than the fetch timeout.
    pub fn build<S>(&self, source: Arc<S>) -> Result<SamplingConfig<S>> {
        if self.fetch_timeout.is_zero() {
            return Err(Error::ZeroFetchTimeout);
        }
        if self.step.as_secs() == 0 {
            return Err(Error::ZeroStep);
        }
        if self.force_timeout < self.fetch_timeout {
            return Err(Error::ForceBeforeFetch {
                fetch: self.fetch_timeout,
                force: self.force_timeout,
            });
        }
        if self.force_timeout == self.fetch_timeout {
            log::warn!(
                "force timeout equals fetch timeout ({:?}); slow fetches may lose the race",
                self.force_timeout
            );
        }

        Ok(SamplingConfig {
            fetch_timeout: self.fetch_timeout,
            force_timeout: self.force_timeout,
            step: self.step,
            proc_root: self.proc_root.clone(),
            classifier: KeyClassifier::new(self.vlan_prefix.clone(), self.default_vlan.clone()),
            source,
        })
    }
}

/// A container to sample, as listed in `CREO_CONTAINERS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTarget {
    pub container_id: ContainerID,
    pub pid: Pid,
    pub cgroup_dir: PathBuf,
}

/// Parses a comma separated list of `<id>:<pid>:<cgroup-dir>` entries.
///
/// Empty entries are skipped. The cgroup directory may itself contain `:`.
///
/// # Errors
///
/// Returns [`Error::InvalidTarget`] for an entry with missing fields, or
/// [`Error::Container`] for an invalid id or pid.
///
/// # Examples
///
/// ```
/// # use creo_metrics::config::parse_targets;
/// let targets = parse_targets("abc:42:/sys/fs/cgroup/abc").unwrap();
/// assert_eq!(targets[0].pid.as_raw(), 42);
/// ```
pub fn parse_targets(src: &str) -> Result<Vec<ContainerTarget>> {
    src.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(pid), Some(dir)) if !dir.is_empty() => Ok(ContainerTarget {
                    container_id: ContainerID::new(id)?,
                    pid: pid.parse()?,
                    cgroup_dir: PathBuf::from(dir),
                }),
                _ => Err(Error::InvalidTarget(entry.to_owned())),
            }
        })
        .collect()
}

fn secs_from_env(var: &'static str) -> Result<Option<Duration>> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| Error::InvalidEnvValue { var, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SamplingConfigBuilder::default().build(Arc::new(())).unwrap();
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.force_timeout(), Duration::from_secs(10));
        assert_eq!(config.step_secs(), 60);
        assert_eq!(config.proc_root(), Path::new("/proc"));
    }

    #[test]
    fn test_force_timeout_before_fetch_timeout() {
        let err = SamplingConfigBuilder::default()
            .set_fetch_timeout(Duration::from_secs(3))
            .set_force_timeout(Duration::from_secs(2))
            .build(Arc::new(()))
            .unwrap_err();
        assert!(matches!(err, Error::ForceBeforeFetch { .. }));
    }

    #[test]
    fn test_parse_targets() {
        let targets =
            parse_targets("abc:10:/sys/fs/cgroup/a, ,def:20:/sys/fs/cgroup/b:c").unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].container_id.as_ref(), "abc");
        assert_eq!(targets[0].pid.as_raw(), 10);
        assert_eq!(targets[1].cgroup_dir, PathBuf::from("/sys/fs/cgroup/b:c"));
    }

    #[test]
    fn test_parse_targets_errors() {
        assert!(matches!(
            parse_targets("abc:10"),
            Err(Error::InvalidTarget(_))
        ));
        assert!(matches!(
            parse_targets("abc:zero:/x"),
            Err(Error::Container(_))
        ));
        assert!(parse_targets("").unwrap().is_empty());
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = SamplingConfigBuilder::default()
            .set_fetch_timeout(Duration::ZERO)
            .build(Arc::new(()))
            .unwrap_err();
        assert!(matches!(err, Error::ZeroFetchTimeout));

        let err = SamplingConfigBuilder::default()
            .set_step(Duration::from_millis(500))
            .build(Arc::new(()))
            .unwrap_err();
        assert!(matches!(err, Error::ZeroStep));
    }
}
