//! Parsers for the cgroup v2 files read by [`CgroupStatsSource`](super::CgroupStatsSource).

mod cpu;
mod error;
mod memory;
mod parser;

pub use cpu::CpuStat;
pub use error::StatParseError;
pub use memory::{MemoryCurrent, MemoryStat};
pub use parser::{KeyValueStat, SingleLineStat};
