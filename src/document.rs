use serde::{Deserialize, Deserializer, Serialize};
use simd_json::{base::ValueAsScalar, OwnedValue};

use crate::decoder::json_text;

/// Access to the `_id` and `_rev` of a document type.
///
/// The client reads the identity before a write and stores what the server assigned
/// afterwards.
pub trait DocumentIdentity {
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn rev(&self) -> Option<&str>;
    fn set_rev(&mut self, rev: String);
}

/// Reply to a single document write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentResponse {
    #[serde(default)]
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

/// Reply of `GET /{db}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default, deserialize_with = "seq_as_text")]
    pub update_seq: Option<String>,
    #[serde(default, deserialize_with = "seq_as_text")]
    pub purge_seq: Option<String>,
    #[serde(default)]
    pub compact_running: bool,
    #[serde(default)]
    pub instance_start_time: Option<String>,
}

/// Per-document outcome of a `_bulk_docs` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentResult {
    pub id: Option<String>,
    pub rev: Option<String>,
    pub error: Option<String>,
    pub reason: Option<String>,
}

impl DocumentResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Reply of a `_bulk_docs` request, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BulkResult {
    pub results: Vec<DocumentResult>,
}

impl BulkResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentResult> {
        self.results.iter()
    }

    /// Entries the server rejected, e.g. with `conflict`.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }
}

impl<'a> IntoIterator for &'a BulkResult {
    type Item = &'a DocumentResult;
    type IntoIter = std::slice::Iter<'a, DocumentResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Request body of `_bulk_docs`.
#[derive(Debug, Serialize)]
pub(crate) struct BulkRequest<'a, T> {
    pub(crate) docs: &'a [T],
}

/// Error body CouchDB sends with non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) error: String,
    #[serde(default)]
    pub(crate) reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UuidList {
    pub(crate) uuids: Vec<String>,
}

/// Older servers send sequences as integers, newer ones as opaque strings.
fn seq_as_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<OwnedValue>::deserialize(deserializer)?;
    Ok(value.map(|value| match value.as_str() {
        Some(text) => text.to_owned(),
        None => json_text(&value),
    }))
}
