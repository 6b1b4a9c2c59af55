//! Counter and rate types exchanged between the stats source, the rate engine
//! and the metric sink.
//!
//! # Main types
//!
//! - [`RawStats`]: one snapshot as delivered by a [`StatsSource`](crate::source::StatsSource).
//! - [`CounterSnapshot`]: the counters of interest, keyed by metric name.
//! - [`RateSample`]: rates and gauges derived from two snapshots, ready for a sink.
//!
//! # Counter keys
//!
//! | key                        | origin                                  |
//! |----------------------------|-----------------------------------------|
//! | `cpu_user`                 | CPU time in user mode (ns)              |
//! | `cpu_system`               | CPU time in kernel mode (ns)            |
//! | `cpu_usage`                | total CPU time (ns)                     |
//! | `mem_usage`                | current memory usage (bytes)            |
//! | `mem_max_usage`            | peak memory usage (bytes)               |
//! | `mem_rss`                  | resident set size (bytes)               |
//! | `<iface>_rx_bytes` etc.    | per-interface network counters          |

mod net;

pub use net::{NetDevParseError, NetworkCounters, parse_net_dev};

use std::collections::BTreeMap;

use serde::Serialize;

/// CPU counters, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuUsage {
    pub usage_in_usermode: u64,
    pub usage_in_kernelmode: u64,
    pub total_usage: u64,
}

/// Memory gauges, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    pub usage: u64,
    pub max_usage: u64,
    pub rss: u64,
}

/// One snapshot of a container's counters as produced by a stats source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawStats {
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    /// Network counters keyed by interface name.
    pub networks: BTreeMap<String, NetworkCounters>,
}

/// Counters of one container taken at a single instant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterSnapshot(BTreeMap<String, u64>);

impl CounterSnapshot {
    /// Extracts the recognised counters from a raw snapshot.
    ///
    /// `extra_interfaces` fills in interfaces that the raw snapshot does not
    /// report itself, e.g. counters read from the process' `net/dev`.
    pub fn from_raw(raw: &RawStats, extra_interfaces: &BTreeMap<String, NetworkCounters>) -> Self {
        let mut snapshot = Self::default();
        snapshot.insert("cpu_user", raw.cpu.usage_in_usermode);
        snapshot.insert("cpu_system", raw.cpu.usage_in_kernelmode);
        snapshot.insert("cpu_usage", raw.cpu.total_usage);
        snapshot.insert("mem_usage", raw.memory.usage);
        snapshot.insert("mem_max_usage", raw.memory.max_usage);
        snapshot.insert("mem_rss", raw.memory.rss);

        for (iface, counters) in &raw.networks {
            snapshot.insert_interface(iface, counters);
        }
        for (iface, counters) in extra_interfaces {
            if !raw.networks.contains_key(iface) {
                snapshot.insert_interface(iface, counters);
            }
        }

        snapshot
    }

    pub fn insert(&mut self, key: impl Into<String>, value: u64) {
        self.0.insert(key.into(), value);
    }

    fn insert_interface(&mut self, iface: &str, counters: &NetworkCounters) {
        self.insert(format!("{iface}_rx_bytes"), counters.rx_bytes);
        self.insert(format!("{iface}_rx_packets"), counters.rx_packets);
        self.insert(format!("{iface}_tx_bytes"), counters.tx_bytes);
        self.insert(format!("{iface}_tx_packets"), counters.tx_packets);
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for CounterSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Rates and gauges derived from two snapshots.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct RateSample(BTreeMap<String, f64>);

impl RateSample {
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawStats {
        RawStats {
            cpu: CpuUsage {
                usage_in_usermode: 10,
                usage_in_kernelmode: 20,
                total_usage: 30,
            },
            memory: MemoryUsage {
                usage: 4096,
                max_usage: 8192,
                rss: 1024,
            },
            networks: BTreeMap::from([(
                "eth0".to_owned(),
                NetworkCounters {
                    rx_bytes: 100,
                    rx_packets: 1,
                    tx_bytes: 200,
                    tx_packets: 2,
                },
            )]),
        }
    }

    #[test]
    fn test_from_raw_extracts_known_keys() {
        let snapshot = CounterSnapshot::from_raw(&raw(), &BTreeMap::new());
        assert_eq!(snapshot.get("cpu_user"), Some(10));
        assert_eq!(snapshot.get("cpu_system"), Some(20));
        assert_eq!(snapshot.get("cpu_usage"), Some(30));
        assert_eq!(snapshot.get("mem_usage"), Some(4096));
        assert_eq!(snapshot.get("mem_max_usage"), Some(8192));
        assert_eq!(snapshot.get("mem_rss"), Some(1024));
        assert_eq!(snapshot.get("eth0_rx_bytes"), Some(100));
        assert_eq!(snapshot.get("eth0_tx_packets"), Some(2));
        assert_eq!(snapshot.len(), 10);
    }

    #[test]
    fn test_raw_interfaces_take_precedence() {
        let extra = BTreeMap::from([
            (
                "eth0".to_owned(),
                NetworkCounters {
                    rx_bytes: 999,
                    ..Default::default()
                },
            ),
            (
                "eth1".to_owned(),
                NetworkCounters {
                    rx_bytes: 7,
                    ..Default::default()
                },
            ),
        ]);
        let snapshot = CounterSnapshot::from_raw(&raw(), &extra);
        assert_eq!(snapshot.get("eth0_rx_bytes"), Some(100));
        assert_eq!(snapshot.get("eth1_rx_bytes"), Some(7));
    }

    #[test]
    fn test_rate_sample_serializes_as_map() {
        let mut sample = RateSample::default();
        sample.insert("mem_rss", 1024.0);
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"mem_rss":1024.0}"#);
    }
}
