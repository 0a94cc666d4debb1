//! kubewatch sinks
//!
//! Rendered records leave the process through [`Sink`]s. A [`Fanout`] writes
//! every record to each configured sink in order and applies that sink's
//! [`FailurePolicy`]. [`Pipeline`] is the event handler the watch loops call:
//! it picks the output shape (nested or flat) and hands the record to the fan-out.

#![forbid(unsafe_code)]

pub mod collector;
pub mod console;
pub mod fanout;
pub mod pipeline;

use async_trait::async_trait;
use kubewatch_core::DeliveryError;

pub use collector::{CollectorSettings, EventLabels, HecSink};
pub use console::ConsoleSink;
pub use fanout::{FailurePolicy, Fanout, Record};
pub use pipeline::{OutputMode, Pipeline};

/// A destination for rendered records.
///
/// Implementations must be safe to call concurrently from several watch loops.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink name for identification and logging
    fn name(&self) -> &'static str;

    /// Write one rendered record (a single JSON document, no trailing newline).
    async fn write(&self, line: &str) -> Result<(), DeliveryError>;
}
