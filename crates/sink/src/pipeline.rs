//! Per-event processing after normalization: shape, then fan out.

use async_trait::async_trait;
use kubewatch_core::{flatten, CanonicalEvent, DeliveryError, EventHandler};
use tracing::trace;

use crate::fanout::{Fanout, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// The canonical document as-is.
    Nested,
    /// Flattened key/value pairs, every key under `root`.
    Flat { root: String },
}

pub struct Pipeline {
    mode: OutputMode,
    fanout: Fanout,
}

impl Pipeline {
    pub fn new(mode: OutputMode, fanout: Fanout) -> Self {
        Self { mode, fanout }
    }

    pub fn mode(&self) -> &OutputMode {
        &self.mode
    }

    pub fn shape(&self, event: CanonicalEvent) -> Record {
        match &self.mode {
            OutputMode::Nested => Record::Canonical(event.record),
            OutputMode::Flat { root } => Record::Flat(flatten(&event.record, root)),
        }
    }
}

#[async_trait]
impl EventHandler for Pipeline {
    async fn handle(&self, event: CanonicalEvent) -> Result<(), DeliveryError> {
        trace!(resource = event.resource, kind = event.kind.as_str(), "delivering event");
        let record = self.shape(event);
        self.fanout.deliver(&record).await
    }
}
