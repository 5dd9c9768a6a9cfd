//! Export definition loading
//!
//! An export run is described by one YAML document: where to connect, which
//! resources and time window to pull, the field list that becomes the row
//! layout, where rows go, and collection tuning. Every setting except the
//! connection details and the field list has a default, and the host and
//! token can come from the environment instead of the file.

use serde::{Deserialize, Serialize};

use crate::collect::CompactionPolicy;
use crate::error::{Error, Result};
use crate::model::{Field, Schema};
use crate::sink::{SinkFormat, TimestampFormat};
use crate::types::{RollupType, TimeWindow};

/// Environment override for `connection.host`
pub const ENV_HOST: &str = "STATFERRY_HOST";
/// Environment override for `connection.token`
pub const ENV_TOKEN: &str = "STATFERRY_TOKEN";

/// Top-level export definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Platform endpoint and credentials
    pub connection: ConnectionConfig,

    /// Resource selection and time window
    pub query: QueryConfig,

    /// Row layout, in declaration order
    pub fields: Vec<FieldSpec>,

    /// Where rows are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Collection tuning
    #[serde(default)]
    pub collect: CollectConfig,
}

/// Platform connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Base URL of the platform API
    #[serde(default)]
    pub host: String,

    /// Bearer token
    #[serde(default)]
    pub token: String,

    /// Verify the server certificate
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Resource selection and time window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Resource kind to export (e.g. `VirtualMachine`)
    pub resource_kind: String,

    /// Restrict to one adapter kind
    #[serde(default)]
    pub adapter_kind: Option<String>,

    /// Restrict to resources with this exact name
    #[serde(default)]
    pub name: Option<String>,

    /// Server-side rollup (`AVG`, `MIN`, `MAX`, `SUM`, `LATEST`, `COUNT`)
    #[serde(default = "default_rollup")]
    pub rollup: String,

    /// Rollup bucket width in minutes
    #[serde(default = "default_rollup_minutes")]
    pub rollup_minutes: u32,

    /// Window length back from now, in hours (ignored when begin/end given)
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,

    /// Explicit window begin in epoch milliseconds
    #[serde(default)]
    pub begin: Option<i64>,

    /// Explicit window end in epoch milliseconds
    #[serde(default)]
    pub end: Option<i64>,

    /// Fetch only the newest sample per metric instead of a window
    #[serde(default)]
    pub latest: bool,
}

/// One output column
///
/// Exactly one of `metric`, `prop` or `tag` names the source; the alias is
/// the column heading. Related-resource keys use the `$parent:Kind.key` or
/// `$child:Kind.key` form.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldSpec {
    /// Column name in the output
    pub alias: String,

    /// Metric key to sample
    #[serde(default)]
    pub metric: Option<String>,

    /// Property key to look up
    #[serde(default)]
    pub prop: Option<String>,

    /// Tag key to look up (shares the property value space)
    #[serde(default)]
    pub tag: Option<String>,

    /// Aggregation applied when several related resources feed one slot
    #[serde(default)]
    pub aggregation: Option<String>,

    /// Hierarchy depth for related-resource lookups
    #[serde(default)]
    pub depth: Option<u32>,
}

/// Output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Sink format (`csv` or `line`)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output file; absent or `-` means stdout
    #[serde(default)]
    pub path: Option<String>,

    /// `host:port` target for the line protocol sink
    #[serde(default)]
    pub address: Option<String>,

    /// Timestamp rendering (`unix` or `rfc3339`)
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    /// Metric name prefix for the line protocol sink
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Collection tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectConfig {
    /// Concurrent fetch workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queued chunks waiting for a worker
    #[serde(default = "default_queue")]
    pub queue: usize,

    /// Row ceiling per stats request, drives chunk sizing
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Resources per catalog listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Spool stats responses to disk before decoding
    #[serde(default)]
    pub spool_responses: bool,

    /// Collapse each rowset to a single row before output
    #[serde(default)]
    pub compact: bool,

    /// Compaction policy (`LATEST`, `MEDIAN`, `LOCAL`)
    #[serde(default = "default_compact_policy")]
    pub compact_policy: String,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_rollup() -> String {
    "AVG".to_string()
}
fn default_rollup_minutes() -> u32 {
    5
}
fn default_lookback_hours() -> u32 {
    24
}
fn default_format() -> String {
    "csv".to_string()
}
fn default_timestamp_format() -> String {
    "unix".to_string()
}
fn default_prefix() -> String {
    "statferry".to_string()
}
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_queue() -> usize {
    256
}
fn default_max_rows() -> usize {
    10_000
}
fn default_page_size() -> usize {
    1_000
}
fn default_compact_policy() -> String {
    "LATEST".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            token: String::new(),
            verify_tls: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            path: None,
            address: None,
            timestamp_format: default_timestamp_format(),
            prefix: default_prefix(),
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue: default_queue(),
            max_rows: default_max_rows(),
            page_size: default_page_size(),
            spool_responses: false,
            compact: false,
            compact_policy: default_compact_policy(),
        }
    }
}

impl ExportConfig {
    /// Parse a YAML export definition
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid export definition: {}", e)))
    }

    /// Load a YAML export definition from a file, with environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path, e)))?;
        let mut config = Self::from_yaml(&text)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var(ENV_HOST) {
            self.connection.host = host;
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            self.connection.token = token;
        }
    }

    /// Check everything that can fail before the first request
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.is_empty() {
            return Err(Error::Configuration(format!(
                "connection.host is not set (or set {})",
                ENV_HOST
            )));
        }
        if self.connection.token.is_empty() {
            return Err(Error::Configuration(format!(
                "connection.token is not set (or set {})",
                ENV_TOKEN
            )));
        }
        if self.query.resource_kind.is_empty() {
            return Err(Error::Configuration(
                "query.resource_kind is not set".to_string(),
            ));
        }
        if self.fields.is_empty() {
            return Err(Error::Configuration("no fields defined".to_string()));
        }
        if self.collect.workers == 0 {
            return Err(Error::Configuration(
                "collect.workers must be at least 1".to_string(),
            ));
        }
        if self.collect.queue == 0 {
            return Err(Error::Configuration(
                "collect.queue must be at least 1".to_string(),
            ));
        }
        if self.collect.max_rows == 0 {
            return Err(Error::Configuration(
                "collect.max_rows must be at least 1".to_string(),
            ));
        }
        if self.collect.page_size == 0 {
            return Err(Error::Configuration(
                "collect.page_size must be at least 1".to_string(),
            ));
        }
        if self.query.rollup_minutes == 0 {
            return Err(Error::Configuration(
                "query.rollup_minutes must be at least 1".to_string(),
            ));
        }
        self.query.rollup.parse::<RollupType>()?;
        self.collect.compact_policy.parse::<CompactionPolicy>()?;
        let format = self.output.format.parse::<SinkFormat>()?;
        self.output.timestamp_format.parse::<TimestampFormat>()?;
        if format == SinkFormat::LineProtocol
            && self.output.address.is_none()
            && self.output.path.is_none()
        {
            return Err(Error::Configuration(
                "line output needs output.address or output.path".to_string(),
            ));
        }
        match (self.query.begin, self.query.end) {
            (Some(b), Some(e)) => {
                TimeWindow::new(b, e)?;
            }
            (None, None) => {}
            _ => {
                return Err(Error::Configuration(
                    "query.begin and query.end must be given together".to_string(),
                ))
            }
        }
        self.compile_schema()?;
        Ok(())
    }

    /// Turn the field list into the row layout
    pub fn compile_schema(&self) -> Result<Schema> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for spec in &self.fields {
            let mut field = match (&spec.metric, &spec.prop, &spec.tag) {
                (Some(key), None, None) => Field::metric(&spec.alias, key)?,
                (None, Some(key), None) => Field::property(&spec.alias, key)?,
                (None, None, Some(key)) => Field::tag(&spec.alias, key)?,
                _ => {
                    return Err(Error::Configuration(format!(
                        "field {}: exactly one of metric, prop or tag must be set",
                        spec.alias
                    )))
                }
            };
            if let Some(agg) = &spec.aggregation {
                field = field.with_aggregation(agg.parse()?);
            }
            if let Some(depth) = spec.depth {
                field = field.with_depth(depth);
            }
            fields.push(field);
        }
        Ok(Schema::build(fields)?)
    }

    /// Resolve the collection window against the given "now"
    ///
    /// `None` means latest-mode: no window, newest sample only.
    pub fn window(&self, now_ms: i64) -> Result<Option<TimeWindow>> {
        if self.query.latest {
            return Ok(None);
        }
        match (self.query.begin, self.query.end) {
            (Some(b), Some(e)) => Ok(Some(TimeWindow::new(b, e)?)),
            _ => {
                let span = self.query.lookback_hours as i64 * 3_600_000;
                Ok(Some(TimeWindow::new(now_ms - span, now_ms)?))
            }
        }
    }
}
