//! Row output
//!
//! A sink receives finished rowsets and writes them somewhere. Workers call
//! [`RowSink::process`] concurrently; each sink serializes internally, so a
//! rowset is never interleaved with another in the output. `preamble` runs
//! once before the first rowset and `close` exactly once after the last,
//! when all workers have drained.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use std::str::FromStr;
use tokio::io::AsyncWrite;

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::model::{Rowset, Schema};

pub mod csv;
pub mod line;

pub use csv::CsvSink;
pub use line::LineSink;

/// Destination for finished rowsets
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Called once before any rowset, e.g. to emit a header
    async fn preamble(&self, schema: &Schema) -> Result<()>;

    /// Write one rowset; returns the number of rows written.
    /// Called concurrently from workers.
    async fn process(&self, rowset: &Rowset, schema: &Schema) -> Result<usize>;

    /// Flush and release the destination
    async fn close(&self) -> Result<()>;

    /// True when the sink owns stdout, so nothing else should print there
    fn produces_output(&self) -> bool {
        true
    }
}

/// The supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    /// Comma-separated rows with a header line
    Csv,
    /// Graphite-style `name value timestamp` lines
    LineProtocol,
}

impl FromStr for SinkFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(SinkFormat::Csv),
            "line" => Ok(SinkFormat::LineProtocol),
            other => Err(Error::Configuration(format!(
                "unknown output format: {} (expected csv or line)",
                other
            ))),
        }
    }
}

/// How timestamps are rendered in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Epoch seconds
    Unix,
    /// RFC 3339, UTC
    Rfc3339,
}

impl TimestampFormat {
    /// Render an epoch-milliseconds timestamp
    pub fn render(&self, ts_ms: i64) -> String {
        match self {
            TimestampFormat::Unix => (ts_ms / 1000).to_string(),
            TimestampFormat::Rfc3339 => match DateTime::from_timestamp_millis(ts_ms) {
                Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
                None => (ts_ms / 1000).to_string(),
            },
        }
    }
}

impl FromStr for TimestampFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unix" => Ok(TimestampFormat::Unix),
            "rfc3339" => Ok(TimestampFormat::Rfc3339),
            other => Err(Error::Configuration(format!(
                "unknown timestamp format: {} (expected unix or rfc3339)",
                other
            ))),
        }
    }
}

/// Build the sink named by the output section
pub async fn build_sink(output: &OutputConfig) -> Result<Box<dyn RowSink>> {
    match output.format.parse::<SinkFormat>()? {
        SinkFormat::Csv => Ok(Box::new(CsvSink::create(output).await?)),
        SinkFormat::LineProtocol => Ok(Box::new(LineSink::create(output).await?)),
    }
}

/// A boxed async writer; file, socket or stdout
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Open the file target, or stdout when absent or `-`.
/// The flag is true when the target is stdout.
pub(crate) async fn open_target(path: Option<&str>) -> Result<(BoxedWriter, bool)> {
    match path {
        None | Some("-") => Ok((Box::new(tokio::io::stdout()), true)),
        Some(p) => {
            let file = tokio::fs::File::create(p).await?;
            Ok((Box::new(file), false))
        }
    }
}
