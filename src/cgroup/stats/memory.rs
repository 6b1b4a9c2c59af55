//! Parsing of the cgroup v2 memory files.
//!
//! - `memory.stat` (key-value) into [`MemoryStat`]; `anon` is reported as RSS.
//! - `memory.current` and `memory.peak` (single value) into [`MemoryCurrent`].

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use super::parser::KeyValueStat;
use super::{SingleLineStat, StatParseError};

/// Memory breakdown from `memory.stat`, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryStat {
    /// Anonymous memory.
    pub anon: u64,
}

impl MemoryStat {
    fn set_anon(&mut self, v: u64) {
        self.anon = v;
    }
}

type Setter = fn(&mut MemoryStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(1);

    m.insert("anon", MemoryStat::set_anon);

    m
});

impl KeyValueStat for MemoryStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

/// A single byte count, as found in `memory.current` or `memory.peak`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryCurrent {
    pub bytes: u64,
}

impl SingleLineStat for MemoryCurrent {
    /// # Errors
    ///
    /// Returns an error of kind `InvalidData` if the line is not a `u64`.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();

        buf.read_line(&mut line)?;
        let line = line.trim();
        let bytes = line
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidValue {
                value: line.to_string(),
                line: 1,
                source,
            })?;

        Ok(MemoryCurrent { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::stats::error::{StatParseError, extract_stat_parse_error};

    #[test]
    fn test_parse_memory_stat() {
        let data = "\
anon 1048576
file 2097152
kernel_stack 16384
";
        let stat = MemoryStat::from_reader(&mut data.as_bytes()).unwrap();
        assert_eq!(stat.anon, 1_048_576);
    }

    #[test]
    fn test_parse_memory_current() {
        let stat = MemoryCurrent::from_reader(&mut "8192\n".as_bytes()).unwrap();
        assert_eq!(stat.bytes, 8192);
    }

    #[test]
    fn test_parse_memory_current_invalid() {
        let err = MemoryCurrent::from_reader(&mut "max\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        match extract_stat_parse_error(&err) {
            StatParseError::InvalidValue { value, line, .. } => {
                assert_eq!(value, "max");
                assert_eq!(*line, 1);
            }
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
