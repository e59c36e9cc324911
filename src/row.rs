use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use simd_json::{base::ValueAsScalar, derived::ValueObjectAccess, OwnedValue, StaticNode};
use std::fmt;
use std::sync::Arc;

use crate::decoder::{decode, json_text, DocumentDecoder, SimdJsonDecoder};
use crate::error::DecodeError;

const FIELD_ID: &str = "id";
const FIELD_KEY: &str = "key";
const FIELD_VALUE: &str = "value";
const FIELD_DOC: &str = "doc";
const FIELD_ERROR: &str = "error";
const FIELD_SEQ: &str = "seq";
const FIELD_CHANGES: &str = "changes";
const FIELD_DELETED: &str = "deleted";

/// Builds a wrapper from one materialized row object.
pub trait FromElement<D>: Sized {
    fn from_element(element: OwnedValue, decoder: Arc<D>) -> Self;
}

/// Looks up `name`, treating an explicit `null` like a missing field.
fn field<'a>(element: &'a OwnedValue, name: &str) -> Option<&'a OwnedValue> {
    element
        .get(name)
        .filter(|value| !matches!(value, OwnedValue::Static(StaticNode::Null)))
}

/// Strings yield their contents; any other value yields its JSON text.
fn field_text(element: &OwnedValue, name: &str) -> Option<String> {
    field(element, name).map(|value| match value.as_str() {
        Some(text) => text.to_owned(),
        None => json_text(value),
    })
}

fn field_as<T, D>(element: &OwnedValue, name: &str, decoder: &D) -> Result<Option<T>, DecodeError>
where
    T: DeserializeOwned,
    D: DocumentDecoder,
{
    field(element, name)
        .map(|value| decode(decoder, value))
        .transpose()
}

/// One entry of a view result.
pub struct Row<D = SimdJsonDecoder> {
    element: OwnedValue,
    decoder: Arc<D>,
}

impl<D> FromElement<D> for Row<D> {
    fn from_element(element: OwnedValue, decoder: Arc<D>) -> Self {
        Self { element, decoder }
    }
}

impl<D: DocumentDecoder> Row<D> {
    pub fn id(&self) -> Option<String> {
        field_text(&self.element, FIELD_ID)
    }

    pub fn id_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_ID)
    }

    pub fn id_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_ID, self.decoder.as_ref())
    }

    pub fn key(&self) -> Option<String> {
        field_text(&self.element, FIELD_KEY)
    }

    pub fn key_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_KEY)
    }

    pub fn key_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_KEY, self.decoder.as_ref())
    }

    pub fn value(&self) -> Option<String> {
        field_text(&self.element, FIELD_VALUE)
    }

    pub fn value_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_VALUE)
    }

    pub fn value_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_VALUE, self.decoder.as_ref())
    }

    /// Present only when the view was queried with `include_docs`.
    pub fn doc(&self) -> Option<String> {
        field_text(&self.element, FIELD_DOC)
    }

    pub fn doc_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_DOC)
    }

    pub fn doc_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_DOC, self.decoder.as_ref())
    }

    /// Set on rows of a multi-key query whose key matched nothing, e.g. `not_found`.
    pub fn error(&self) -> Option<String> {
        field_text(&self.element, FIELD_ERROR)
    }

    pub fn error_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_ERROR)
    }

    pub fn error_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_ERROR, self.decoder.as_ref())
    }

    /// The whole row object as parsed from the stream.
    pub fn element(&self) -> &OwnedValue {
        &self.element
    }
}

impl<D> Clone for Row<D> {
    fn clone(&self) -> Self {
        Self {
            element: self.element.clone(),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl<D> fmt::Display for Row<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&json_text(&self.element))
    }
}

impl<D> fmt::Debug for Row<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Row").field(&self.element).finish()
    }
}

/// A revision listed in the `changes` array of a change entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReference {
    pub rev: String,
}

/// One entry of a changes feed.
pub struct DocumentChange<D = SimdJsonDecoder> {
    element: OwnedValue,
    decoder: Arc<D>,
}

impl<D> FromElement<D> for DocumentChange<D> {
    fn from_element(element: OwnedValue, decoder: Arc<D>) -> Self {
        Self { element, decoder }
    }
}

impl<D: DocumentDecoder> DocumentChange<D> {
    /// Sequence of this change; numeric sequences of older servers come back as text.
    pub fn seq(&self) -> Option<String> {
        field_text(&self.element, FIELD_SEQ)
    }

    pub fn seq_as_i64(&self) -> Option<i64> {
        let seq = field(&self.element, FIELD_SEQ)?;
        seq.as_i64().or_else(|| seq.as_str()?.parse().ok())
    }

    pub fn seq_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_SEQ)
    }

    pub fn seq_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_SEQ, self.decoder.as_ref())
    }

    pub fn id(&self) -> Option<String> {
        field_text(&self.element, FIELD_ID)
    }

    pub fn id_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_ID)
    }

    pub fn id_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_ID, self.decoder.as_ref())
    }

    /// JSON text of the whole `changes` array.
    pub fn changes_text(&self) -> Option<String> {
        field_text(&self.element, FIELD_CHANGES)
    }

    pub fn changes_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_CHANGES)
    }

    /// Revision ids of this change, in feed order.
    pub fn changes(&self) -> Result<Vec<String>, DecodeError> {
        Ok(self
            .changes_as_references()?
            .into_iter()
            .map(|reference| reference.rev)
            .collect())
    }

    pub fn changes_as_references(&self) -> Result<Vec<ChangeReference>, DecodeError> {
        self.changes_as()
    }

    /// Decodes each element of the `changes` array; a missing array yields no elements.
    pub fn changes_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, DecodeError> {
        let Some(changes) = self.changes_element() else {
            return Ok(Vec::new());
        };
        match changes {
            OwnedValue::Array(items) => items
                .iter()
                .map(|item| decode(self.decoder.as_ref(), item))
                .collect(),
            other => Err(DecodeError::Shape {
                field: FIELD_CHANGES.to_owned(),
                message: format!("expected an array but found {}", json_text(other)),
            }),
        }
    }

    pub fn is_deleted(&self) -> bool {
        field(&self.element, FIELD_DELETED)
            .and_then(|deleted| deleted.as_bool())
            .unwrap_or(false)
    }

    pub fn doc(&self) -> Option<String> {
        field_text(&self.element, FIELD_DOC)
    }

    pub fn doc_element(&self) -> Option<&OwnedValue> {
        field(&self.element, FIELD_DOC)
    }

    pub fn doc_as<T: DeserializeOwned>(&self) -> Result<Option<T>, DecodeError> {
        field_as(&self.element, FIELD_DOC, self.decoder.as_ref())
    }

    pub fn element(&self) -> &OwnedValue {
        &self.element
    }
}

impl<D> Clone for DocumentChange<D> {
    fn clone(&self) -> Self {
        Self {
            element: self.element.clone(),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl<D> fmt::Display for DocumentChange<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&json_text(&self.element))
    }
}

impl<D> fmt::Debug for DocumentChange<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DocumentChange").field(&self.element).finish()
    }
}
