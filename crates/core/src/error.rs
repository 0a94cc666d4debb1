//! Error taxonomy shared by all kubewatch crates.

use thiserror::Error;

/// A resource name outside the statically supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resource: {0}")]
pub struct UnknownResource(pub String);

/// Misconfiguration detected at startup. Always fatal before any watch begins.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(transparent)]
    UnknownResource(#[from] UnknownResource),
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("cluster client: {0}")]
    Cluster(String),
    #[error("collector client: {0}")]
    Collector(String),
}

/// A payload that could not be rendered into a canonical document.
#[derive(Debug, Error)]
#[error("cannot encode {resource} payload: {source}")]
pub struct EncodingError {
    pub resource: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// A single field skipped while flattening. The rest of the record is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaAnomaly {
    #[error("{path}: null leaf has no flat representation")]
    NullLeaf { path: String },
    #[error("{path}: key already produced by another path")]
    KeyCollision { path: String },
}

impl SchemaAnomaly {
    pub fn path(&self) -> &str {
        match self {
            SchemaAnomaly::NullLeaf { path } | SchemaAnomaly::KeyCollision { path } => path,
        }
    }
}

/// Failure writing a record to a sink.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{sink}: rejected with HTTP {status}: {body}")]
    Rejected { sink: &'static str, status: u16, body: String },
    #[error("{sink}: collector answered code {code}: {text}")]
    Refused { sink: &'static str, code: i64, text: String },
    #[error("{sink}: transport failure: {message}")]
    Transport { sink: &'static str, message: String },
    #[error("{sink}: {source}")]
    Io {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl DeliveryError {
    pub fn sink(&self) -> &'static str {
        match self {
            DeliveryError::Rejected { sink, .. }
            | DeliveryError::Refused { sink, .. }
            | DeliveryError::Transport { sink, .. }
            | DeliveryError::Io { sink, .. } => sink,
        }
    }
}
