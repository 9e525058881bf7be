pub mod jsonl;

pub use jsonl::JsonlSink;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Serialize, Deserialize};

/// Which loop a metric or text sample came from. Used as the tag prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "TRAIN",
            Phase::Val => "VAL",
        }
    }

    /// `"<PHASE>/<name>"`
    pub fn tag(&self, name: &str) -> String {
        format!("{}/{}", self.as_str(), name)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for step-indexed scalars and text samples.
///
/// Writes are fire-and-forget: a sink that cannot persist a record logs the
/// failure and carries on, so telemetry never aborts training.
pub trait MetricsSink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: u64);

    fn record_text(&mut self, tag: &str, text: &str, step: u64);

    fn flush(&mut self) {}
}

/// A sink shared with the caller, who can inspect it after the run.
impl<S: MetricsSink> MetricsSink for Rc<RefCell<S>> {
    fn record_scalar(&mut self, tag: &str, value: f64, step: u64) {
        self.borrow_mut().record_scalar(tag, value, step);
    }

    fn record_text(&mut self, tag: &str, text: &str, step: u64) {
        self.borrow_mut().record_text(tag, text, step);
    }

    fn flush(&mut self) {
        self.borrow_mut().flush();
    }
}

/// Discards everything. Stands in when telemetry is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record_scalar(&mut self, _tag: &str, _value: f64, _step: u64) {}

    fn record_text(&mut self, _tag: &str, _text: &str, _step: u64) {}
}

/// One telemetry record, as stored by `MemorySink` and written by `JsonlSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricRecord {
    Scalar { tag: String, value: f64, step: u64 },
    Text { tag: String, text: String, step: u64 },
}

impl MetricRecord {
    pub fn tag(&self) -> &str {
        match self {
            MetricRecord::Scalar { tag, .. } | MetricRecord::Text { tag, .. } => tag,
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub records: Vec<MetricRecord>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    /// `(step, value)` pairs recorded under `tag`, in recording order.
    pub fn scalars(&self, tag: &str) -> Vec<(u64, f64)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                MetricRecord::Scalar { tag: t, value, step } if t == tag => Some((*step, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self, tag: &str) -> Vec<(u64, String)> {
        self.records
            .iter()
            .filter_map(|r| match r {
                MetricRecord::Text { tag: t, text, step } if t == tag => Some((*step, text.clone())),
                _ => None,
            })
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn record_scalar(&mut self, tag: &str, value: f64, step: u64) {
        self.records.push(MetricRecord::Scalar { tag: tag.to_string(), value, step });
    }

    fn record_text(&mut self, tag: &str, text: &str, step: u64) {
        self.records.push(MetricRecord::Text { tag: tag.to_string(), text: text.to_string(), step });
    }
}
