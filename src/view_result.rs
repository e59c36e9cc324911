use std::sync::Arc;
use tracing::instrument;

use crate::body::ResponseBody;
use crate::decoder::{DocumentDecoder, SimdJsonDecoder};
use crate::error::CouchError;
use crate::results::ViewResult;
use crate::row_iter::{RowIter, ViewRows};
use crate::streaming::{StreamCore, FIELD_ROWS};
use crate::token_reader::ReaderConfig;

/// A view response read row by row from the open body.
///
/// Construction consumes the header (`total_rows`, `offset`, `update_seq`) and stops at
/// the first row, so the metadata is available before and during iteration. The body
/// is released by [`close`](Self::close) or when the result is dropped.
///
/// ```no_run
/// # use couch_stream::{StreamingViewResult, SimdJsonDecoder, CouchError};
/// # use std::sync::Arc;
/// # async fn run() -> Result<(), CouchError> {
/// let body: &'static [u8] = br#"{"total_rows":1,"offset":0,"rows":[{"id":"a","key":"a","value":1}]}"#;
/// let mut result = StreamingViewResult::new(Arc::new(SimdJsonDecoder), body).await?;
/// let mut rows = result.iterator()?;
/// while rows.has_next().await? {
///     let row = rows.next_row().await?;
///     println!("{:?}", row.id());
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamingViewResult<R: ResponseBody, D = SimdJsonDecoder> {
    core: StreamCore<R, D>,
}

impl<R: ResponseBody, D: DocumentDecoder> StreamingViewResult<R, D> {
    pub async fn new(decoder: Arc<D>, body: R) -> Result<Self, CouchError> {
        Self::with_config(decoder, body, ReaderConfig::default()).await
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn with_config(
        decoder: Arc<D>,
        body: R,
        config: ReaderConfig,
    ) -> Result<Self, CouchError> {
        let core = StreamCore::open(body, decoder, config, FIELD_ROWS).await?;
        Ok(Self { core })
    }

    pub fn offset(&self) -> i64 {
        self.core.metadata.offset
    }

    pub fn total_rows(&self) -> i64 {
        self.core.metadata.total_rows
    }

    /// Present when the view was queried with `update_seq=true`. Numeric sequences are
    /// returned as their decimal text.
    pub fn update_seq(&self) -> Option<&str> {
        self.core.metadata.update_seq.as_deref()
    }

    /// Returns the only iterator this result will ever hand out.
    pub fn iterator(&mut self) -> Result<ViewRows<'_, R, D>, CouchError> {
        self.core.issue_iterator()?;
        Ok(RowIter::new(&mut self.core))
    }

    pub fn close(&mut self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Drains every row into memory and releases the body.
    pub async fn collect(mut self) -> Result<ViewResult<D>, CouchError> {
        let mut rows = Vec::new();
        let mut iter = self.iterator()?;
        while iter.has_next().await? {
            rows.push(iter.next_row().await?);
        }
        let metadata = self.core.metadata.clone();
        self.close();
        Ok(ViewResult {
            offset: metadata.offset,
            total_rows: metadata.total_rows,
            update_seq: metadata.update_seq,
            rows,
        })
    }
}
