//! CSV sink
//!
//! One output line per row: timestamp, resource name, then every field of
//! the layout in declaration order. Absent slots become empty cells, so a
//! metric that was never reported is distinguishable from one that is zero.

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::config::OutputConfig;
use crate::error::Result;
use crate::model::{Rowset, Schema};
use crate::sink::{open_target, BoxedWriter, RowSink, TimestampFormat};

/// CSV writer over a file or stdout
pub struct CsvSink {
    writer: Mutex<BufWriter<BoxedWriter>>,
    timestamps: TimestampFormat,
    to_stdout: bool,
}

impl CsvSink {
    /// Open the target named by the output section
    pub async fn create(output: &OutputConfig) -> Result<Self> {
        let (target, to_stdout) = open_target(output.path.as_deref()).await?;
        Ok(CsvSink {
            writer: Mutex::new(BufWriter::new(target)),
            timestamps: output.timestamp_format.parse()?,
            to_stdout,
        })
    }

    fn render_rowset(&self, rowset: &Rowset, schema: &Schema) -> (String, usize) {
        let name = rowset
            .resource_name()
            .unwrap_or_else(|| rowset.resource_id().as_str());
        let mut out = String::new();
        let mut rows = 0;
        for (ts, row) in rowset.rows() {
            out.push_str(&self.timestamps.render(ts));
            out.push(',');
            out.push_str(&quote(name));
            for field in schema.fields() {
                out.push(',');
                if field.kind.is_property_like() {
                    if let Some(value) = row.prop(field.row_index) {
                        out.push_str(&quote(value));
                    }
                } else if let Some(value) = row.metric(field.row_index) {
                    out.push_str(&value.to_string());
                }
            }
            out.push('\n');
            rows += 1;
        }
        (out, rows)
    }
}

#[async_trait::async_trait]
impl RowSink for CsvSink {
    async fn preamble(&self, schema: &Schema) -> Result<()> {
        let mut header = String::from("timestamp,resourceName");
        for field in schema.fields() {
            header.push(',');
            header.push_str(&quote(&field.alias));
        }
        header.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(header.as_bytes()).await?;
        Ok(())
    }

    async fn process(&self, rowset: &Rowset, schema: &Schema) -> Result<usize> {
        let (text, rows) = self.render_rowset(rowset, schema);
        // One lock hold per rowset keeps its lines contiguous in the output.
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        Ok(rows)
    }

    async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    }

    fn produces_output(&self) -> bool {
        self.to_stdout
    }
}

/// Quote a cell when it contains a separator, quote or newline
fn quote(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
