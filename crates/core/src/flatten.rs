//! Structural flattening of canonical documents.
//!
//! A nested [`Document`] becomes a single-level map of path keys to strings,
//! for indexers that only understand flat fields:
//!
//! - mapping children extend the path with `_<key>`
//! - sequences emit `<path>#` holding the length, then `<path><index>` per element
//! - booleans render as `"true"`/`"false"`, numbers as plain decimal text
//!
//! The transform is lossy on purpose: once flattened, `true`, `3` and `"3"` are
//! all strings and cannot be told apart. Nulls have no flat form and are skipped.

use std::fmt::Write as _;

use indexmap::{map::Entry, IndexMap};
use metrics::counter;
use serde_json::Number;
use tracing::warn;

use crate::{Document, SchemaAnomaly};

/// Flat key/value rendering of a document, in depth-first emission order.
pub type FlatRecord = IndexMap<String, String>;

/// Root namespace used by the binary for every flattened key.
pub const DEFAULT_ROOT: &str = "kubewatch";

/// Flatten `doc` under `root`, logging and skipping anomalous fields.
pub fn flatten(doc: &Document, root: &str) -> FlatRecord {
    let (record, anomalies) = flatten_with_anomalies(doc, root);
    if !anomalies.is_empty() {
        counter!("kubewatch_schema_anomalies_total", anomalies.len() as u64);
        for anomaly in &anomalies {
            warn!(path = %anomaly.path(), %anomaly, "skipping field while flattening");
        }
    }
    record
}

/// Like [`flatten`] but hands the skipped fields back instead of logging them.
pub fn flatten_with_anomalies(doc: &Document, root: &str) -> (FlatRecord, Vec<SchemaAnomaly>) {
    let mut walk = Walk::default();
    let mut path = root.to_string();
    walk.visit(&mut path, doc);
    (walk.out, walk.anomalies)
}

#[derive(Default)]
struct Walk {
    out: FlatRecord,
    anomalies: Vec<SchemaAnomaly>,
}

impl Walk {
    // `path` is a shared buffer; every branch restores it before returning.
    fn visit(&mut self, path: &mut String, node: &Document) {
        match node {
            Document::Bool(b) => self.emit(path.clone(), b.to_string()),
            Document::Number(n) => self.emit(path.clone(), render_number(n)),
            Document::String(s) => self.emit(path.clone(), s.clone()),
            Document::Mapping(fields) => {
                for (key, child) in fields {
                    let mark = path.len();
                    if !path.is_empty() {
                        path.push('_');
                    }
                    path.push_str(key);
                    self.visit(path, child);
                    path.truncate(mark);
                }
            }
            Document::Sequence(items) => {
                self.emit(format!("{path}#"), items.len().to_string());
                for (idx, item) in items.iter().enumerate() {
                    let mark = path.len();
                    let _ = write!(path, "{idx}");
                    self.visit(path, item);
                    path.truncate(mark);
                }
            }
            Document::Null => self.anomalies.push(SchemaAnomaly::NullLeaf { path: path.clone() }),
        }
    }

    fn emit(&mut self, key: String, value: String) {
        match self.out.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(taken) => {
                self.anomalies.push(SchemaAnomaly::KeyCollision { path: taken.key().clone() });
            }
        }
    }
}

/// Integers keep their exact digits; floats use fixed-point notation.
fn render_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string())
    }
}
