//! Destinations for computed rates.
//!
//! [`MetricSink`] is the seam to a remote ingestion service. [`FalconSink`]
//! renders each value as an open-falcon style item and writes one JSON object
//! per line, which is what the bundled binary sends to stdout.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::stats::RateSample;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write metrics: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink writer lock poisoned")]
    Poisoned,
    #[error("sink writer still in use")]
    Busy,
    #[error("sink write task failed: {0}")]
    Worker(#[source] tokio::task::JoinError),
    #[error("metrics rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// Accepts one batch of measurements per sampling window.
pub trait MetricSink: Send + Sync + 'static {
    /// Sends `values` for `endpoint`, tagged with `tag`.
    ///
    /// `timestamp` is in UNIX epoch seconds, `step` is the sampling interval in seconds.
    fn send(
        &self,
        values: &RateSample,
        endpoint: &str,
        tag: &str,
        timestamp: i64,
        step: i64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// One measurement in open-falcon's push format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FalconItem<'a> {
    pub endpoint: &'a str,
    pub metric: &'a str,
    pub value: f64,
    pub step: i64,
    pub counter_type: &'static str,
    pub tags: &'a str,
    pub timestamp: i64,
}

/// Writes measurements as JSON lines of [`FalconItem`]s.
///
/// Items are encoded on the calling task; the write itself runs under
/// `spawn_blocking`.
#[derive(Debug)]
pub struct FalconSink<W> {
    writer: Arc<Mutex<W>>,
}

impl<W: Write> FalconSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Returns the writer once no write is in flight.
    pub fn into_inner(self) -> Result<W> {
        Arc::try_unwrap(self.writer)
            .map_err(|_| SinkError::Busy)?
            .into_inner()
            .map_err(|_| SinkError::Poisoned)
    }
}

/// Encodes `values` as newline separated JSON items, skipping non-finite values.
fn encode_batch(
    values: &RateSample,
    endpoint: &str,
    tag: &str,
    timestamp: i64,
    step: i64,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(values.len() * 128);
    for (metric, value) in values.iter() {
        if !value.is_finite() {
            log::warn!("dropping non-finite value for `{metric}` ({endpoint})");
            continue;
        }
        let item = FalconItem {
            endpoint,
            metric,
            value,
            step,
            counter_type: "GAUGE",
            tags: tag,
            timestamp,
        };
        serde_json::to_writer(&mut buf, &item)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

impl<W: Write + Send + 'static> MetricSink for FalconSink<W> {
    async fn send(
        &self,
        values: &RateSample,
        endpoint: &str,
        tag: &str,
        timestamp: i64,
        step: i64,
    ) -> Result<()> {
        let buf = encode_batch(values, endpoint, tag, timestamp, step)?;
        if buf.is_empty() {
            return Ok(());
        }

        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer = writer.lock().map_err(|_| SinkError::Poisoned)?;
            writer.write_all(&buf)?;
            writer.flush()?;
            Ok(())
        })
        .await
        .map_err(SinkError::Worker)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_falcon_sink_writes_json_lines() {
        let sink = FalconSink::new(Vec::new());
        let mut values = RateSample::default();
        values.insert("cpu_usage_rate", 0.5);
        values.insert("mem_rss", 1024.0);

        sink.send(&values, "host-a", "container=abc", 1_700_000_000, 60)
            .await
            .unwrap();

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["metric"], "cpu_usage_rate");
        assert_eq!(lines[0]["value"], 0.5);
        assert_eq!(lines[0]["endpoint"], "host-a");
        assert_eq!(lines[0]["counterType"], "GAUGE");
        assert_eq!(lines[0]["tags"], "container=abc");
        assert_eq!(lines[0]["step"], 60);
        assert_eq!(lines[1]["metric"], "mem_rss");
        assert_eq!(lines[1]["timestamp"], 1_700_000_000i64);
    }

    #[tokio::test]
    async fn test_non_finite_values_are_dropped() {
        let sink = FalconSink::new(Vec::new());
        let mut values = RateSample::default();
        values.insert("cpu_usage_rate", f64::NAN);

        sink.send(&values, "host-a", "", 0, 60).await.unwrap();
        assert!(sink.into_inner().unwrap().is_empty());
    }

    /// Remembers the thread each write ran on.
    #[derive(Default)]
    struct ThreadRecorder {
        threads: Vec<std::thread::ThreadId>,
    }

    impl Write for ThreadRecorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.threads.push(std::thread::current().id());
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_runs_off_the_runtime_thread() {
        let sink = FalconSink::new(ThreadRecorder::default());
        let mut values = RateSample::default();
        values.insert("mem_rss", 1.0);

        sink.send(&values, "host-a", "", 0, 60).await.unwrap();

        let recorder = sink.into_inner().unwrap();
        assert!(!recorder.threads.is_empty());
        let runtime_thread = std::thread::current().id();
        assert!(recorder.threads.iter().all(|id| *id != runtime_thread));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("broken pipe"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let sink = FalconSink::new(FailingWriter);
        let mut values = RateSample::default();
        values.insert("mem_rss", 1.0);

        let err = sink.send(&values, "host-a", "", 0, 60).await.unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
