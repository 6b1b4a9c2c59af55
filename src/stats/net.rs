use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::num::ParseIntError;

/// Per-interface network counters, as reported in `/proc/<pid>/net/dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkCounters {
    /// Bytes received.
    pub rx_bytes: u64,
    /// Packets received.
    pub rx_packets: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Packets transmitted.
    pub tx_packets: u64,
}

/// Number of receive columns preceding the transmit columns.
const RX_FIELDS: usize = 8;

const IGNORED_INTERFACES: [&str; 1] = ["lo"];

/// A `net/dev` line that cannot be turned into counters.
///
/// Converts into [`std::io::Error`] with kind `InvalidData`.
#[derive(Debug, thiserror::Error)]
pub enum NetDevParseError {
    #[error("malformed interface line {line}: '{content}'")]
    MalformedLine { line: usize, content: String },
    #[error("invalid value for '{iface}' at line {line}: '{value}': {source}")]
    InvalidValue {
        iface: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },
}

impl From<NetDevParseError> for io::Error {
    fn from(err: NetDevParseError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

fn is_ignored_interface(iface: &str) -> bool {
    IGNORED_INTERFACES.contains(&iface)
}

/// Reads the byte and packet counters from the data fields of one interface line.
fn counters_from_fields(
    iface: &str,
    data: &str,
    line: usize,
) -> Result<NetworkCounters, NetDevParseError> {
    let fields: Vec<&str> = data.split_whitespace().take(RX_FIELDS + 2).collect();
    if fields.len() < RX_FIELDS + 2 {
        return Err(NetDevParseError::MalformedLine {
            line,
            content: format!("{iface}:{data}").trim_end().to_owned(),
        });
    }
    let value = |idx: usize| {
        fields[idx]
            .parse::<u64>()
            .map_err(|source| NetDevParseError::InvalidValue {
                iface: iface.to_owned(),
                value: fields[idx].to_owned(),
                line,
                source,
            })
    };
    Ok(NetworkCounters {
        rx_bytes: value(0)?,
        rx_packets: value(1)?,
        tx_bytes: value(RX_FIELDS)?,
        tx_packets: value(RX_FIELDS + 1)?,
    })
}

/// Parses a `/proc/<pid>/net/dev` style buffer into counters keyed by interface.
///
/// The two header lines and blank lines are skipped and the loopback
/// interface is left out. A half-written or garbled table is rejected as a
/// whole, so no interface ever reports a counter that was not read.
///
/// # Errors
///
/// Returns an I/O error if reading from the buffer fails, or one of kind
/// `InvalidData` wrapping a [`NetDevParseError`] for a malformed interface line.
pub fn parse_net_dev<R: BufRead>(buf: &mut R) -> io::Result<BTreeMap<String, NetworkCounters>> {
    let mut out = BTreeMap::new();
    let mut line = String::new();

    // Skip headers (first two lines)
    for _ in 0..2 {
        buf.read_line(&mut line)?;
        line.clear();
    }

    let mut line_no = 2;
    while buf.read_line(&mut line)? != 0 {
        line_no += 1;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let (iface, data) = trimmed.split_once(':').ok_or_else(|| {
                NetDevParseError::MalformedLine {
                    line: line_no,
                    content: trimmed.to_owned(),
                }
            })?;
            let iface = iface.trim();
            if !is_ignored_interface(iface) {
                let counters = counters_from_fields(iface, data, line_no)?;
                out.insert(iface.to_owned(), counters);
            }
        }
        line.clear();
    }

    Ok(out)
}
