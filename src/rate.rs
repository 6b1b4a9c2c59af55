//! Conversion of cumulative counters into rates.
//!
//! Keys are classified by prefix:
//!
//! - `cpu_*` counters become `<key>_rate`, per nanosecond of wall time.
//! - network counters (keys starting with the VLAN prefix or the default VLAN)
//!   become `<key>.rate`, per second.
//! - `mem*` gauges are passed through unchanged.
//!
//! Anything else is dropped. A classified counter that went backwards between
//! the two snapshots (container restart, wrap) is left out of that window.

use std::time::Duration;

use crate::stats::{CounterSnapshot, RateSample};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateError {
    #[error("invalid sampling window: elapsed time must be positive")]
    InvalidWindow,
}

pub type Result<T> = std::result::Result<T, RateError>;

/// How a counter key is turned into an output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Cumulative CPU time, reported per nanosecond.
    Cpu,
    /// Cumulative interface counter, reported per second.
    Network,
    /// Absolute gauge, reported as-is.
    Memory,
}

/// Classifies counter keys using the configured interface prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyClassifier {
    vlan_prefix: String,
    default_vlan: String,
}

impl KeyClassifier {
    pub fn new(vlan_prefix: impl Into<String>, default_vlan: impl Into<String>) -> Self {
        Self {
            vlan_prefix: vlan_prefix.into(),
            default_vlan: default_vlan.into(),
        }
    }

    /// Returns the kind of `key`, or `None` if no rule matches.
    ///
    /// Empty prefixes never match.
    pub fn classify(&self, key: &str) -> Option<MetricKind> {
        if key.starts_with("cpu_") {
            Some(MetricKind::Cpu)
        } else if has_prefix(key, &self.vlan_prefix) || has_prefix(key, &self.default_vlan) {
            Some(MetricKind::Network)
        } else if key.starts_with("mem") {
            Some(MetricKind::Memory)
        } else {
            None
        }
    }
}

fn has_prefix(key: &str, prefix: &str) -> bool {
    !prefix.is_empty() && key.starts_with(prefix)
}

/// The wall time between two successful reads of a container's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow(Duration);

impl SampleWindow {
    /// Builds the window between `last` and `now`.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidWindow`] if `now` is not strictly after `last`.
    pub fn between(last: tokio::time::Instant, now: tokio::time::Instant) -> Result<Self> {
        match now.checked_duration_since(last) {
            Some(elapsed) if !elapsed.is_zero() => Ok(Self(elapsed)),
            _ => Err(RateError::InvalidWindow),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.0
    }
}

/// Computes rates and gauges from two snapshots taken `elapsed` apart.
///
/// A key missing from `previous` is treated as a counter starting at zero.
///
/// # Errors
///
/// Returns [`RateError::InvalidWindow`] if `elapsed` is zero.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use creo_metrics::rate::{KeyClassifier, compute_rates};
/// use creo_metrics::stats::CounterSnapshot;
///
/// let previous: CounterSnapshot = [("cpu_usage", 1000)].into_iter().collect();
/// let current: CounterSnapshot = [("cpu_usage", 5000)].into_iter().collect();
/// let classifier = KeyClassifier::new("eth", "eth0");
///
/// let rates = compute_rates(&current, &previous, Duration::from_secs(1), &classifier).unwrap();
/// assert_eq!(rates.get("cpu_usage_rate"), Some(4000.0 / 1e9));
/// ```
pub fn compute_rates(
    current: &CounterSnapshot,
    previous: &CounterSnapshot,
    elapsed: Duration,
    classifier: &KeyClassifier,
) -> Result<RateSample> {
    if elapsed.is_zero() {
        return Err(RateError::InvalidWindow);
    }
    let elapsed_nanos = elapsed.as_nanos() as f64;
    let elapsed_secs = elapsed.as_secs_f64();

    let mut rates = RateSample::default();
    for (key, value) in current.iter() {
        let Some(kind) = classifier.classify(key) else {
            continue;
        };
        let delta = value.checked_sub(previous.get(key).unwrap_or(0));
        match (kind, delta) {
            (MetricKind::Cpu, Some(delta)) => {
                rates.insert(format!("{key}_rate"), delta as f64 / elapsed_nanos);
            }
            (MetricKind::Network, Some(delta)) => {
                rates.insert(format!("{key}.rate"), delta as f64 / elapsed_secs);
            }
            (MetricKind::Memory, _) => {
                rates.insert(key, value as f64);
            }
            (_, None) => {
                log::trace!("counter `{key}` decreased ({value}), skipping this window");
            }
        }
    }

    Ok(rates)
}
