//! Line protocol sink
//!
//! Graphite-style plaintext: one `prefix.resource.alias value timestamp`
//! line per present metric slot, timestamps in epoch seconds as the
//! protocol requires. Property fields have no numeric value and are left
//! out. The target is either a TCP endpoint or a file.

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::OutputConfig;
use crate::error::Result;
use crate::model::{FieldKind, Rowset, Schema};
use crate::sink::{open_target, BoxedWriter, RowSink};

/// Plaintext metric lines over TCP or into a file
pub struct LineSink {
    writer: Mutex<BufWriter<BoxedWriter>>,
    prefix: String,
    to_stdout: bool,
}

impl LineSink {
    /// Connect to `output.address`, or fall back to the file target
    pub async fn create(output: &OutputConfig) -> Result<Self> {
        let (target, to_stdout): (BoxedWriter, bool) = match &output.address {
            Some(addr) => (Box::new(TcpStream::connect(addr).await?), false),
            None => open_target(output.path.as_deref()).await?,
        };
        Ok(LineSink {
            writer: Mutex::new(BufWriter::new(target)),
            prefix: output.prefix.clone(),
            to_stdout,
        })
    }

    fn render_rowset(&self, rowset: &Rowset, schema: &Schema) -> (String, usize) {
        let resource = sanitize(
            rowset
                .resource_name()
                .unwrap_or_else(|| rowset.resource_id().as_str()),
        );
        let mut out = String::new();
        let mut rows = 0;
        for (ts, row) in rowset.rows() {
            for field in schema.fields() {
                if field.kind != FieldKind::Metric {
                    continue;
                }
                if let Some(value) = row.metric(field.row_index) {
                    out.push_str(&self.prefix);
                    out.push('.');
                    out.push_str(&resource);
                    out.push('.');
                    out.push_str(&sanitize(&field.alias));
                    out.push(' ');
                    out.push_str(&value.to_string());
                    out.push(' ');
                    out.push_str(&(ts / 1000).to_string());
                    out.push('\n');
                }
            }
            rows += 1;
        }
        (out, rows)
    }
}

#[async_trait::async_trait]
impl RowSink for LineSink {
    async fn preamble(&self, _schema: &Schema) -> Result<()> {
        // The protocol has no header.
        Ok(())
    }

    async fn process(&self, rowset: &Rowset, schema: &Schema) -> Result<usize> {
        let (text, rows) = self.render_rowset(rowset, schema);
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

/// Collapse everything outside `[A-Za-z0-9_-]` so names stay one path segment
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use crate::types::ResourceId;

    #[tokio::test]
    async fn renders_metric_lines_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path = path.to_str().unwrap();
        let schema = Schema::build(vec![
            Field::metric("cpuDemand", "cpu|demandmhz").unwrap(),
            Field::property("powerState", "summary|runtime|powerState").unwrap(),
        ])
        .unwrap();

        let mut rowset = Rowset::new(ResourceId::from("vm-1"));
        rowset.set_resource_name("vm one.prod");
        {
            let row = rowset.row_mut(100_000, &schema);
            row.set_metric(0, 1.5);
            row.set_prop(0, "poweredOn");
        }
        rowset.row_mut(200_000, &schema);

        let output = OutputConfig {
            format: "line".to_string(),
            path: Some(path.to_string()),
            prefix: "vrops".to_string(),
            ..OutputConfig::default()
        };
        let sink = LineSink::create(&output).await.unwrap();
        sink.preamble(&schema).await.unwrap();
        sink.process(&rowset, &schema).await.unwrap();
        sink.close().await.unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["vrops.vm_one_prod.cpuDemand 1.5 100"]);
    }

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(sanitize("vm one.prod"), "vm_one_prod");
        assert_eq!(sanitize("plain-name_9"), "plain-name_9");
    }
}
