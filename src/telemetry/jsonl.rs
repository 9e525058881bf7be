use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::TrainResult;
use crate::telemetry::{MetricRecord, MetricsSink};

/// Appends one JSON object per record to a file.
///
/// Lines look like
/// `{"kind":"scalar","tag":"TRAIN/loss","value":0.93,"step":12}`.
pub struct JsonlSink {
    path: PathBuf,
    writer: BufWriter<File>,
    failed: bool,
}

impl JsonlSink {
    /// Opens `path` for appending, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> TrainResult<JsonlSink> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(JsonlSink { path, writer: BufWriter::new(file), failed: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, record: &MetricRecord) {
        let result = serde_json::to_writer(&mut self.writer, record)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"));
        if let Err(err) = result {
            // Warn once; a broken metrics file should not flood the log.
            if !self.failed {
                warn!(path = %self.path.display(), error = %err, "failed to write metric record");
                self.failed = true;
            }
        }
    }
}

impl MetricsSink for JsonlSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: u64) {
        self.write(&MetricRecord::Scalar { tag: tag.to_string(), value, step });
    }

    fn record_text(&mut self, tag: &str, text: &str, step: u64) {
        self.write(&MetricRecord::Text { tag: tag.to_string(), text: text.to_string(), step });
    }

    fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!(path = %self.path.display(), error = %err, "failed to flush metrics file");
        }
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
