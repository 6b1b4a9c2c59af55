//! Parsing of the cgroup v2 `cpu.stat` file.
//!
//! ```rust
//! use creo_metrics::cgroup::stats::{CpuStat, KeyValueStat};
//!
//! let data = "usage_usec 1000000\nuser_usec 600000\nsystem_usec 400000\nnr_periods 10\n";
//! let stat = CpuStat::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(stat.usage_usec, 1_000_000);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::KeyValueStat;
use crate::stats::CpuUsage;

const NANOS_PER_MICRO: u64 = 1_000;

/// CPU time counters from `cpu.stat`, in microseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStat {
    /// Total time that the cgroup used CPU (user + system).
    pub usage_usec: u64,
    /// Time spent in user space.
    pub user_usec: u64,
    /// Time spent in kernel space.
    pub system_usec: u64,
}

impl CpuStat {
    fn set_usage_usec(&mut self, usage_usec: u64) {
        self.usage_usec = usage_usec;
    }

    fn set_user_usec(&mut self, user_usec: u64) {
        self.user_usec = user_usec;
    }

    fn set_system_usec(&mut self, system_usec: u64) {
        self.system_usec = system_usec;
    }

    /// Converts to the nanosecond counters expected by the rate engine.
    pub fn to_cpu_usage(&self) -> CpuUsage {
        CpuUsage {
            usage_in_usermode: self.user_usec.saturating_mul(NANOS_PER_MICRO),
            usage_in_kernelmode: self.system_usec.saturating_mul(NANOS_PER_MICRO),
            total_usage: self.usage_usec.saturating_mul(NANOS_PER_MICRO),
        }
    }
}

type Setter = fn(&mut CpuStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(3);

    m.insert("usage_usec", CpuStat::set_usage_usec);
    m.insert("user_usec", CpuStat::set_user_usec);
    m.insert("system_usec", CpuStat::set_system_usec);

    m
});

impl KeyValueStat for CpuStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}
