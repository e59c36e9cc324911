use std::marker::PhantomData;
use std::sync::Arc;

use async_stream::try_stream;
use tokio_stream::Stream;

use crate::body::ResponseBody;
use crate::decoder::{DocumentDecoder, SimdJsonDecoder};
use crate::error::CouchError;
use crate::row::{DocumentChange, FromElement, Row};
use crate::streaming::StreamCore;

/// Single-use, forward-only cursor over the row array of a streaming result.
///
/// The iterator borrows its result mutably, so the result cannot be closed or asked
/// for a second iterator while this one is alive.
pub struct RowIter<'a, R: ResponseBody, D, T> {
    core: &'a mut StreamCore<R, D>,
    _row: PhantomData<fn() -> T>,
}

/// Iterator over the rows of a view result.
pub type ViewRows<'a, R, D = SimdJsonDecoder> = RowIter<'a, R, D, Row<D>>;

/// Iterator over the entries of a changes feed.
pub type ChangeRows<'a, R, D = SimdJsonDecoder> = RowIter<'a, R, D, DocumentChange<D>>;

impl<'a, R, D, T> RowIter<'a, R, D, T>
where
    R: ResponseBody,
    D: DocumentDecoder,
    T: FromElement<D>,
{
    pub(crate) fn new(core: &'a mut StreamCore<R, D>) -> Self {
        Self {
            core,
            _row: PhantomData,
        }
    }

    /// Whether another row follows. Reaching the end of the array enables trailer access.
    pub async fn has_next(&mut self) -> Result<bool, CouchError> {
        self.core.has_next_row().await
    }

    /// Reads exactly one row from the stream.
    ///
    /// Fails with [`CouchError::IterationExhausted`] once the array is drained.
    pub async fn next_row(&mut self) -> Result<T, CouchError> {
        let element = self.core.next_element().await?;
        Ok(T::from_element(element, Arc::clone(&self.core.decoder)))
    }

    pub fn rows_read(&self) -> u64 {
        self.core.rows_read()
    }

    /// Turns the iterator into a [`Stream`] that ends after the last row.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<T, CouchError>> + 'a
    where
        T: 'a,
    {
        try_stream! {
            while self.has_next().await? {
                let row = self.next_row().await?;
                yield row;
            }
        }
    }
}

// The header has been read before any row, so it stays available mid-iteration.
impl<'a, R: ResponseBody, D> RowIter<'a, R, D, Row<D>> {
    pub fn offset(&self) -> i64 {
        self.core.metadata.offset
    }

    pub fn total_rows(&self) -> i64 {
        self.core.metadata.total_rows
    }

    pub fn update_seq(&self) -> Option<&str> {
        self.core.metadata.update_seq.as_deref()
    }
}
