use serde::de::DeserializeOwned;

use crate::decoder::{DocumentDecoder, SimdJsonDecoder};
use crate::error::DecodeError;
use crate::row::{DocumentChange, Row};

/// A view response held entirely in memory.
#[derive(Debug)]
pub struct ViewResult<D = SimdJsonDecoder> {
    pub offset: i64,
    pub total_rows: i64,
    pub update_seq: Option<String>,
    pub rows: Vec<Row<D>>,
}

impl<D: DocumentDecoder> ViewResult<D> {
    /// Decodes the `value` of every row, skipping rows without one.
    pub fn values_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, DecodeError> {
        self.rows
            .iter()
            .filter_map(|row| row.value_as::<T>().transpose())
            .collect()
    }

    /// Decodes the embedded documents of an `include_docs` query.
    pub fn docs_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, DecodeError> {
        self.rows
            .iter()
            .filter_map(|row| row.doc_as::<T>().transpose())
            .collect()
    }
}

/// A changes response held entirely in memory.
#[derive(Debug)]
pub struct ChangesResult<D = SimdJsonDecoder> {
    pub changes: Vec<DocumentChange<D>>,
    pub last_seq: Option<String>,
}
