//! kubewatch core: canonical event documents, normalization and flattening

#![forbid(unsafe_code)]

pub mod document;
pub mod error;
pub mod event;
pub mod flatten;

pub use document::Document;
pub use error::{ConfigurationError, DeliveryError, EncodingError, SchemaAnomaly, UnknownResource};
pub use event::{normalize, CanonicalEvent, EventKind, WatchEvent};
pub use flatten::{flatten, flatten_with_anomalies, FlatRecord, DEFAULT_ROOT};

/// Consumer of normalized events, called synchronously from a watch loop.
///
/// An `Err` means the event could not reach a sink that must not lose data;
/// the caller treats it as fatal and begins shutdown.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: CanonicalEvent) -> Result<(), DeliveryError>;
}
