use std::sync::Arc;
use tracing::instrument;

use crate::body::ResponseBody;
use crate::decoder::{DocumentDecoder, SimdJsonDecoder};
use crate::error::CouchError;
use crate::results::ChangesResult;
use crate::row_iter::{ChangeRows, RowIter};
use crate::streaming::{StreamCore, FIELD_RESULTS};
use crate::token_reader::ReaderConfig;

/// A `_changes` response read entry by entry.
///
/// `last_seq` follows the `results` array on the wire, so it can only be read after
/// the iterator has reported the end of the array.
pub struct StreamingChangesResult<R: ResponseBody, D = SimdJsonDecoder> {
    core: StreamCore<R, D>,
}

impl<R: ResponseBody, D: DocumentDecoder> StreamingChangesResult<R, D> {
    pub async fn new(decoder: Arc<D>, body: R) -> Result<Self, CouchError> {
        Self::with_config(decoder, body, ReaderConfig::default()).await
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn with_config(
        decoder: Arc<D>,
        body: R,
        config: ReaderConfig,
    ) -> Result<Self, CouchError> {
        let core = StreamCore::open(body, decoder, config, FIELD_RESULTS).await?;
        Ok(Self { core })
    }

    /// Returns the only iterator this result will ever hand out.
    pub fn iterator(&mut self) -> Result<ChangeRows<'_, R, D>, CouchError> {
        self.core.issue_iterator()?;
        Ok(RowIter::new(&mut self.core))
    }

    /// Sequence to resume the feed from.
    ///
    /// Fails with [`CouchError::RowsNotConsumed`] until the iterator has been drained.
    /// The first successful call reads the rest of the response; later calls return
    /// the stored value, also after [`close`](Self::close).
    pub async fn last_seq(&mut self) -> Result<Option<String>, CouchError> {
        self.core.last_seq().await
    }

    pub fn close(&mut self) {
        self.core.close();
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Drains every change into memory, reads `last_seq` and releases the body.
    pub async fn collect(mut self) -> Result<ChangesResult<D>, CouchError> {
        let mut changes = Vec::new();
        let mut iter = self.iterator()?;
        while iter.has_next().await? {
            changes.push(iter.next_row().await?);
        }
        let last_seq = self.last_seq().await?;
        self.close();
        Ok(ChangesResult { changes, last_seq })
    }
}
