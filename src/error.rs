use std::fmt;

/// Kind of the next token in a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Object,
    EndObject,
    Array,
    EndArray,
    Name,
    String,
    Number,
    Boolean,
    Null,
    EndDocument,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Object => "object",
            TokenKind::EndObject => "end of object",
            TokenKind::Array => "array",
            TokenKind::EndArray => "end of array",
            TokenKind::Name => "member name",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Boolean => "boolean",
            TokenKind::Null => "null",
            TokenKind::EndDocument => "end of document",
        };
        f.write_str(name)
    }
}

/// Failures of the token reader. Offsets are absolute byte positions in the body.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] simd_json::Error),
    #[error("Timeout while waiting for data")]
    Timeout,
    #[error("Incomplete JSON data at byte {0}")]
    IncompleteData(u64),
    #[error("Syntax error at byte {offset}: {message}")]
    Syntax { offset: u64, message: String },
    #[error("Expected {expected} but found {found} at byte {offset}")]
    UnexpectedToken {
        expected: TokenKind,
        found: TokenKind,
        offset: u64,
    },
    #[error("JSON value exceeds the maximum buffer size of {0} bytes")]
    ValueTooLarge(usize),
    #[error("Reader was closed")]
    Closed,
}

/// A field could not be decoded into the requested type.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("JSON decoding error: {0}")]
    Json(#[from] simd_json::Error),
    #[error("Field '{field}' has an unexpected shape: {message}")]
    Shape { field: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CouchError {
    #[error("Data access error: {0}")]
    DataAccess(#[from] ReaderError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Access to the result is not possible after it was closed")]
    ResultClosed,
    #[error("Iterator can only be created once")]
    IteratorAlreadyCreated,
    #[error("All rows must be read from the iterator first")]
    RowsNotConsumed,
    #[error("Attempt to iterate beyond the result set")]
    IterationExhausted,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CouchDB returned {status}: {error} ({reason})")]
    Status {
        status: u16,
        error: String,
        reason: String,
    },
}

impl CouchError {
    /// True for misuse of a streaming result, as opposed to I/O or decode failures.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CouchError::ResultClosed
                | CouchError::IteratorAlreadyCreated
                | CouchError::RowsNotConsumed
                | CouchError::IterationExhausted
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CouchError::Status { status, .. } => Some(*status),
            #[cfg(feature = "http")]
            CouchError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
