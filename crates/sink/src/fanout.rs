//! Delivery of one record to every configured sink.

use std::sync::Arc;

use kubewatch_core::{DeliveryError, Document, FlatRecord};
use metrics::counter;
use tracing::{error, warn};

use crate::Sink;

/// What a sink failure means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and carry on.
    BestEffort,
    /// Surface the error; the caller stops forwarding.
    Fatal,
}

/// A record ready for rendering, in one of the two output shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Canonical(Document),
    Flat(FlatRecord),
}

impl Record {
    /// Single-line JSON text shared by every sink.
    pub fn render(&self) -> serde_json::Result<String> {
        match self {
            Record::Canonical(doc) => doc.to_json_line(),
            Record::Flat(flat) => serde_json::to_string(flat),
        }
    }
}

struct Target {
    sink: Arc<dyn Sink>,
    policy: FailurePolicy,
}

/// Ordered set of sinks. Built once at startup and shared read-only.
#[derive(Default)]
pub struct Fanout {
    targets: Vec<Target>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sink; records are written to sinks in the order they were added.
    pub fn with(mut self, sink: Arc<dyn Sink>, policy: FailurePolicy) -> Self {
        self.targets.push(Target { sink, policy });
        self
    }

    pub fn sinks(&self) -> impl Iterator<Item = (&'static str, FailurePolicy)> + '_ {
        self.targets.iter().map(|t| (t.sink.name(), t.policy))
    }

    /// Render `record` once and write it to each sink.
    ///
    /// Stops at the first failing [`FailurePolicy::Fatal`] sink and returns its
    /// error; sinks after it do not see the record.
    pub async fn deliver(&self, record: &Record) -> Result<(), DeliveryError> {
        let line = match record.render() {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "record cannot be rendered; dropped");
                return Ok(());
            }
        };
        for target in &self.targets {
            let sink = target.sink.name();
            if let Err(e) = target.sink.write(&line).await {
                counter!("kubewatch_sink_failures_total", 1u64, "sink" => sink);
                match target.policy {
                    FailurePolicy::BestEffort => warn!(sink, error = %e, "sink write failed; continuing"),
                    FailurePolicy::Fatal => return Err(e),
                }
            }
        }
        Ok(())
    }
}
