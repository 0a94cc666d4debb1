//! Watch events and their normalization into canonical documents.

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::{Document, EncodingError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Deleted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Deleted => "deleted",
        }
    }
}

/// A typed add/delete notification produced by a watch loop.
#[derive(Debug, Clone)]
pub struct WatchEvent<K> {
    pub resource: &'static str,
    pub kind: EventKind,
    pub payload: K,
}

/// A watch event after normalization; this is what handlers receive.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub resource: &'static str,
    pub kind: EventKind,
    pub record: Document,
}

/// Serialize the typed payload into its canonical document form.
pub fn normalize<K: Serialize>(event: &WatchEvent<K>) -> Result<Document, EncodingError> {
    let value = serde_json::to_value(&event.payload).map_err(|source| {
        counter!("kubewatch_encoding_errors_total", 1u64, "resource" => event.resource);
        EncodingError { resource: event.resource, source }
    })?;
    Ok(Document::from(value))
}

impl<K: Serialize> WatchEvent<K> {
    /// Normalize and keep the event identity alongside the record.
    pub fn into_canonical(self) -> Result<CanonicalEvent, EncodingError> {
        let record = normalize(&self)?;
        Ok(CanonicalEvent { resource: self.resource, kind: self.kind, record })
    }
}
