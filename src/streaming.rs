use simd_json::OwnedValue;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::body::ResponseBody;
use crate::decoder::DocumentDecoder;
use crate::error::{CouchError, ReaderError, TokenKind};
use crate::token_reader::{JsonTokenReader, ReaderConfig};

pub(crate) const FIELD_OFFSET: &str = "offset";
pub(crate) const FIELD_TOTAL_ROWS: &str = "total_rows";
pub(crate) const FIELD_UPDATE_SEQ: &str = "update_seq";
pub(crate) const FIELD_LAST_SEQ: &str = "last_seq";
pub(crate) const FIELD_ROWS: &str = "rows";
pub(crate) const FIELD_RESULTS: &str = "results";

/// Who may still touch the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Unopened,
    Iterating,
    Closed { iterated: bool },
}

/// Where the reader cursor is in the response document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    ReadingHeader,
    ReadingRows,
    ReadingTrailer,
    Done,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Metadata {
    pub(crate) offset: i64,
    pub(crate) total_rows: i64,
    pub(crate) update_seq: Option<String>,
    pub(crate) last_seq: Option<String>,
}

/// Reader, body and bookkeeping shared by view and changes results.
pub(crate) struct StreamCore<R: ResponseBody, D> {
    reader: JsonTokenReader<R>,
    pub(crate) decoder: Arc<D>,
    pub(crate) metadata: Metadata,
    lifecycle: Lifecycle,
    phase: Phase,
    rows_read: u64,
}

impl<R: ResponseBody, D: DocumentDecoder> StreamCore<R, D> {
    /// Reads the header up to the row array named `rows_field`.
    ///
    /// On failure the body is disconnected when the half-built core is dropped.
    pub(crate) async fn open(
        body: R,
        decoder: Arc<D>,
        config: ReaderConfig,
        rows_field: &'static str,
    ) -> Result<Self, CouchError> {
        let mut core = Self {
            reader: JsonTokenReader::with_config(body, config),
            decoder,
            metadata: Metadata::default(),
            lifecycle: Lifecycle::Unopened,
            phase: Phase::ReadingHeader,
            rows_read: 0,
        };
        if let Err(e) = core.read_header(rows_field).await {
            warn!(error = %e, "failed to read response header");
            return Err(e.into());
        }
        Ok(core)
    }

    #[instrument(level = "debug", skip(self))]
    async fn read_header(&mut self, rows_field: &'static str) -> Result<(), ReaderError> {
        self.reader.begin_object().await?;
        while self.reader.has_next().await? {
            let name = self.reader.next_name().await?;
            if name == rows_field {
                self.reader.begin_array().await?;
                self.phase = Phase::ReadingRows;
                debug!(offset = self.reader.position(), "positioned at first row");
                return Ok(());
            }
            self.read_metadata_field(&name).await?;
        }
        self.reader.end_object().await?;
        self.phase = Phase::Done;
        debug!("response has no '{}' array", rows_field);
        Ok(())
    }

    async fn read_metadata_field(&mut self, name: &str) -> Result<(), ReaderError> {
        match name {
            FIELD_OFFSET => {
                if let Some(offset) = self.next_optional_i64().await? {
                    self.metadata.offset = offset;
                }
            }
            FIELD_TOTAL_ROWS => {
                if let Some(total_rows) = self.next_optional_i64().await? {
                    self.metadata.total_rows = total_rows;
                }
            }
            FIELD_UPDATE_SEQ => self.metadata.update_seq = self.next_optional_text().await?,
            FIELD_LAST_SEQ => self.metadata.last_seq = self.next_optional_text().await?,
            _ => self.reader.skip_value().await?,
        }
        Ok(())
    }

    async fn next_optional_i64(&mut self) -> Result<Option<i64>, ReaderError> {
        if self.reader.peek().await? == TokenKind::Null {
            self.reader.next_null().await?;
            return Ok(None);
        }
        self.reader.next_i64().await.map(Some)
    }

    async fn next_optional_text(&mut self) -> Result<Option<String>, ReaderError> {
        if self.reader.peek().await? == TokenKind::Null {
            self.reader.next_null().await?;
            return Ok(None);
        }
        self.reader.next_scalar_text().await.map(Some)
    }

    /// Hands out the single iterator of this result.
    pub(crate) fn issue_iterator(&mut self) -> Result<(), CouchError> {
        match self.lifecycle {
            Lifecycle::Closed { .. } => Err(CouchError::ResultClosed),
            Lifecycle::Iterating => Err(CouchError::IteratorAlreadyCreated),
            Lifecycle::Unopened => {
                self.lifecycle = Lifecycle::Iterating;
                Ok(())
            }
        }
    }

    /// Moves to `ReadingTrailer` once the row array reports no more elements.
    pub(crate) async fn has_next_row(&mut self) -> Result<bool, CouchError> {
        if matches!(self.lifecycle, Lifecycle::Closed { .. }) {
            return Err(CouchError::ResultClosed);
        }
        if self.phase != Phase::ReadingRows {
            return Ok(false);
        }
        if self.reader.has_next().await? {
            return Ok(true);
        }
        self.phase = Phase::ReadingTrailer;
        debug!(rows = self.rows_read, "row array exhausted");
        Ok(false)
    }

    pub(crate) async fn next_element(&mut self) -> Result<OwnedValue, CouchError> {
        if !self.has_next_row().await? {
            return Err(CouchError::IterationExhausted);
        }
        let element = self.reader.read_object().await?;
        self.rows_read += 1;
        #[cfg(feature = "metrics")]
        crate::metrics::ROWS_STREAMED.inc();
        Ok(element)
    }

    /// Trailing `last_seq`, parsed on first access once every row was read.
    pub(crate) async fn last_seq(&mut self) -> Result<Option<String>, CouchError> {
        let iterated = match self.lifecycle {
            Lifecycle::Unopened => false,
            Lifecycle::Iterating => true,
            Lifecycle::Closed { iterated } => iterated,
        };
        if !iterated {
            return Err(CouchError::RowsNotConsumed);
        }
        match self.phase {
            Phase::ReadingHeader | Phase::ReadingRows => Err(CouchError::RowsNotConsumed),
            Phase::Done => Ok(self.metadata.last_seq.clone()),
            Phase::ReadingTrailer => {
                if matches!(self.lifecycle, Lifecycle::Closed { .. }) {
                    return Err(CouchError::ResultClosed);
                }
                self.read_trailer().await?;
                Ok(self.metadata.last_seq.clone())
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn read_trailer(&mut self) -> Result<(), ReaderError> {
        // a retry after a timeout may find the array already closed
        if self.reader.peek().await? == TokenKind::EndArray {
            self.reader.end_array().await?;
        }
        while self.reader.has_next().await? {
            let name = self.reader.next_name().await?;
            self.read_metadata_field(&name).await?;
        }
        self.reader.end_object().await?;
        self.phase = Phase::Done;
        Ok(())
    }
}

impl<R: ResponseBody, D> StreamCore<R, D> {
    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Closed { .. })
    }

    pub(crate) fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Disconnects the body. Safe to call any number of times.
    pub(crate) fn close(&mut self) {
        let iterated = match self.lifecycle {
            Lifecycle::Closed { .. } => return,
            Lifecycle::Unopened => false,
            Lifecycle::Iterating => true,
        };
        self.lifecycle = Lifecycle::Closed { iterated };
        self.reader.get_mut().disconnect();
        self.reader.close();
        debug!(rows = self.rows_read, "streaming result closed");
    }
}

impl<R: ResponseBody, D> Drop for StreamCore<R, D> {
    fn drop(&mut self) {
        self.close();
    }
}
