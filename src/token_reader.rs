use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;
use simd_json::OwnedValue;
use std::time::Duration;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::timeout,
};
use tracing::{instrument, trace};

use crate::error::{ReaderError, TokenKind};
use crate::scan::{is_whitespace, scalar_len, ContainerScanner, StringScanner};

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Bytes requested from the body per read.
    pub buffer_size: usize,
    /// Upper bound for a single read; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Largest single value (one row, one skipped field) that may be buffered.
    pub max_buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 8 * 1024,
            timeout: None,
            max_buffer_size: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    EmptyDocument,
    NonEmptyDocument,
    EmptyArray,
    NonEmptyArray,
    EmptyObject,
    NonEmptyObject,
    DanglingName,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peeked {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    Name,
    String,
    Number,
    True,
    False,
    Null,
    EndDocument,
}

impl Peeked {
    fn kind(self) -> TokenKind {
        match self {
            Peeked::BeginObject => TokenKind::Object,
            Peeked::EndObject => TokenKind::EndObject,
            Peeked::BeginArray => TokenKind::Array,
            Peeked::EndArray => TokenKind::EndArray,
            Peeked::Name => TokenKind::Name,
            Peeked::String => TokenKind::String,
            Peeked::Number => TokenKind::Number,
            Peeked::True | Peeked::False => TokenKind::Boolean,
            Peeked::Null => TokenKind::Null,
            Peeked::EndDocument => TokenKind::EndDocument,
        }
    }
}

/// Pull-based JSON tokenizer over an asynchronous byte source.
///
/// Only the bytes of the token currently being read are buffered, so a response with
/// millions of rows is read in constant memory as long as every row fits into
/// [`ReaderConfig::max_buffer_size`].
pub struct JsonTokenReader<R> {
    reader: R,
    buffer: BytesMut,
    config: ReaderConfig,
    stack: Vec<Scope>,
    peeked: Option<Peeked>,
    consumed: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> JsonTokenReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, ReaderConfig::default())
    }

    pub fn with_config(reader: R, config: ReaderConfig) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(config.buffer_size),
            config,
            stack: vec![Scope::EmptyDocument],
            peeked: None,
            consumed: 0,
            eof: false,
        }
    }

    /// Number of bytes of the body consumed so far.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn is_closed(&self) -> bool {
        self.stack.last() == Some(&Scope::Closed)
    }

    /// Drops buffered data; every later call fails with [`ReaderError::Closed`].
    pub fn close(&mut self) {
        self.buffer.clear();
        self.peeked = None;
        self.stack.clear();
        self.stack.push(Scope::Closed);
    }

    pub async fn peek(&mut self) -> Result<TokenKind, ReaderError> {
        Ok(self.peek_token().await?.kind())
    }

    /// Whether the current array or object has another element.
    pub async fn has_next(&mut self) -> Result<bool, ReaderError> {
        let peeked = self.peek_token().await?;
        Ok(!matches!(
            peeked,
            Peeked::EndObject | Peeked::EndArray | Peeked::EndDocument
        ))
    }

    pub async fn begin_object(&mut self) -> Result<(), ReaderError> {
        self.expect(Peeked::BeginObject).await?;
        self.consume_peeked(1);
        self.stack.push(Scope::EmptyObject);
        Ok(())
    }

    pub async fn end_object(&mut self) -> Result<(), ReaderError> {
        self.expect(Peeked::EndObject).await?;
        self.consume_peeked(1);
        self.stack.pop();
        Ok(())
    }

    pub async fn begin_array(&mut self) -> Result<(), ReaderError> {
        self.expect(Peeked::BeginArray).await?;
        self.consume_peeked(1);
        self.stack.push(Scope::EmptyArray);
        Ok(())
    }

    pub async fn end_array(&mut self) -> Result<(), ReaderError> {
        self.expect(Peeked::EndArray).await?;
        self.consume_peeked(1);
        self.stack.pop();
        Ok(())
    }

    pub async fn next_name(&mut self) -> Result<String, ReaderError> {
        self.expect(Peeked::Name).await?;
        self.read_string_token().await
    }

    pub async fn next_string(&mut self) -> Result<String, ReaderError> {
        self.expect(Peeked::String).await?;
        self.read_string_token().await
    }

    /// Reads a string or a number as text. Numbers keep their literal spelling.
    pub async fn next_scalar_text(&mut self) -> Result<String, ReaderError> {
        match self.peek_token().await? {
            Peeked::String => self.read_string_token().await,
            Peeked::Number => {
                let offset = self.consumed;
                let text = self.read_scalar_token().await?;
                if text.parse::<f64>().is_err() {
                    return Err(syntax(offset, format!("malformed number '{text}'")));
                }
                Ok(text)
            }
            other => Err(self.unexpected(TokenKind::String, other)),
        }
    }

    /// Reads an integer, also accepting one spelled as a string.
    pub async fn next_i64(&mut self) -> Result<i64, ReaderError> {
        let offset = self.consumed;
        let text = match self.peek_token().await? {
            Peeked::Number => self.read_scalar_token().await?,
            Peeked::String => self.read_string_token().await?,
            other => return Err(self.unexpected(TokenKind::Number, other)),
        };
        text.parse::<i64>()
            .map_err(|_| syntax(offset, format!("expected an integer but found '{text}'")))
    }

    pub async fn next_bool(&mut self) -> Result<bool, ReaderError> {
        let expected = match self.peek_token().await? {
            Peeked::True => "true",
            Peeked::False => "false",
            other => return Err(self.unexpected(TokenKind::Boolean, other)),
        };
        let offset = self.consumed;
        let text = self.read_scalar_token().await?;
        if text != expected {
            return Err(syntax(offset, format!("invalid literal '{text}'")));
        }
        Ok(expected == "true")
    }

    pub async fn next_null(&mut self) -> Result<(), ReaderError> {
        self.expect(Peeked::Null).await?;
        let offset = self.consumed;
        let text = self.read_scalar_token().await?;
        if text != "null" {
            return Err(syntax(offset, format!("invalid literal '{text}'")));
        }
        Ok(())
    }

    /// Discards the next value, including everything nested inside it. The value is
    /// still checked to be well-formed JSON.
    #[instrument(level = "trace", skip(self))]
    pub async fn skip_value(&mut self) -> Result<(), ReaderError> {
        let peeked = self.peek_token().await?;
        let len = self.value_len(peeked).await?;
        trace!(bytes = len, offset = self.consumed, "skipping value");
        let mut skipped = self.buffer[..len].to_vec();
        simd_json::to_borrowed_value(&mut skipped)?;
        self.consume_peeked(len);
        Ok(())
    }

    /// Returns the bytes of exactly one value and moves past it.
    pub async fn read_raw_value(&mut self) -> Result<Bytes, ReaderError> {
        let peeked = self.peek_token().await?;
        let len = self.value_len(peeked).await?;
        let raw = self.buffer.split_to(len).freeze();
        self.consumed += len as u64;
        self.peeked = None;
        Ok(raw)
    }

    /// Materializes the next value into a generic JSON tree.
    pub async fn read_value(&mut self) -> Result<OwnedValue, ReaderError> {
        let raw = self.read_raw_value().await?;
        let mut owned = raw.to_vec();
        Ok(simd_json::to_owned_value(&mut owned)?)
    }

    /// Like [`read_value`](Self::read_value) but the value must be an object.
    pub async fn read_object(&mut self) -> Result<OwnedValue, ReaderError> {
        self.expect(Peeked::BeginObject).await?;
        self.read_value().await
    }

    async fn fill_buffer(&mut self) -> Result<usize, ReaderError> {
        if self.buffer.len() >= self.config.max_buffer_size {
            return Err(ReaderError::ValueTooLarge(self.config.max_buffer_size));
        }
        self.buffer.reserve(self.config.buffer_size);

        let read_fut = self.reader.read_buf(&mut self.buffer);
        let bytes_read = match self.config.timeout {
            Some(t) => timeout(t, read_fut)
                .await
                .map_err(|_| ReaderError::Timeout)??,
            None => read_fut.await?,
        };
        if bytes_read == 0 {
            self.eof = true;
        }

        #[cfg(feature = "metrics")]
        crate::metrics::BUFFERED_BYTES.set(self.buffer.len() as i64);
        Ok(bytes_read)
    }

    async fn fill_more(&mut self) -> Result<(), ReaderError> {
        if self.eof || self.fill_buffer().await? == 0 {
            return Err(ReaderError::IncompleteData(
                self.consumed + self.buffer.len() as u64,
            ));
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.buffer.advance(n);
        self.consumed += n as u64;
    }

    fn consume_peeked(&mut self, n: usize) {
        self.advance(n);
        self.peeked = None;
    }

    /// Skips whitespace and returns the next byte without consuming it.
    async fn peek_non_ws(&mut self) -> Result<Option<u8>, ReaderError> {
        loop {
            let ws = self.buffer.iter().take_while(|&&b| is_whitespace(b)).count();
            if ws > 0 {
                self.advance(ws);
            }
            if let Some(&byte) = self.buffer.first() {
                return Ok(Some(byte));
            }
            if self.eof || self.fill_buffer().await? == 0 {
                return Ok(None);
            }
        }
    }

    async fn expect_non_ws(&mut self) -> Result<u8, ReaderError> {
        self.peek_non_ws()
            .await?
            .ok_or(ReaderError::IncompleteData(self.consumed))
    }

    /// Position and value of the first non-whitespace byte at or after `from`.
    /// Nothing is consumed.
    async fn non_ws_at(&mut self, from: usize) -> Result<(usize, u8), ReaderError> {
        loop {
            let found = self
                .buffer
                .iter()
                .enumerate()
                .skip(from)
                .find(|(_, b)| !is_whitespace(**b));
            if let Some((at, &byte)) = found {
                return Ok((at, byte));
            }
            self.fill_more().await?;
        }
    }

    async fn expect(&mut self, want: Peeked) -> Result<(), ReaderError> {
        let peeked = self.peek_token().await?;
        if peeked != want {
            return Err(self.unexpected(want.kind(), peeked));
        }
        Ok(())
    }

    async fn peek_token(&mut self) -> Result<Peeked, ReaderError> {
        if let Some(peeked) = self.peeked {
            return Ok(peeked);
        }
        let peeked = self.do_peek().await?;
        self.peeked = Some(peeked);
        Ok(peeked)
    }

    /// Consumes the separator owed by the current scope and classifies the next token.
    /// The token itself stays in the buffer. Nothing but whitespace is consumed and the
    /// scope is left untouched until the token is known, so a failed read can be retried.
    async fn do_peek(&mut self) -> Result<Peeked, ReaderError> {
        let top = self.stack.len().checked_sub(1).ok_or(ReaderError::Closed)?;
        let scope = self.stack[top];
        let (next_scope, separator) = match scope {
            Scope::Closed => return Err(ReaderError::Closed),
            Scope::EmptyArray => (Scope::NonEmptyArray, 0),
            Scope::NonEmptyArray => match self.expect_non_ws().await? {
                b']' => return Ok(Peeked::EndArray),
                b',' => (Scope::NonEmptyArray, 1),
                _ => return Err(self.syntax_here("expected ',' or ']' in array")),
            },
            Scope::EmptyObject | Scope::NonEmptyObject => {
                let separator = match (scope, self.expect_non_ws().await?) {
                    (_, b'}') => return Ok(Peeked::EndObject),
                    (Scope::NonEmptyObject, b',') => 1,
                    (Scope::NonEmptyObject, _) => {
                        return Err(self.syntax_here("expected ',' or '}' in object"))
                    }
                    _ => 0,
                };
                let (at, byte) = self.non_ws_at(separator).await?;
                if byte != b'"' {
                    return Err(syntax(self.consumed + at as u64, "expected a member name".to_owned()));
                }
                self.advance(at);
                self.stack[top] = Scope::DanglingName;
                return Ok(Peeked::Name);
            }
            Scope::DanglingName => match self.expect_non_ws().await? {
                b':' => (Scope::NonEmptyObject, 1),
                _ => return Err(self.syntax_here("expected ':' after member name")),
            },
            Scope::EmptyDocument => (Scope::NonEmptyDocument, 0),
            Scope::NonEmptyDocument => {
                return match self.peek_non_ws().await? {
                    None => Ok(Peeked::EndDocument),
                    Some(_) => Err(self.syntax_here("trailing data after top-level value")),
                };
            }
        };

        let (at, byte) = self.non_ws_at(separator).await?;
        let peeked = match byte {
            b'{' => Peeked::BeginObject,
            b'[' => Peeked::BeginArray,
            b']' if scope == Scope::EmptyArray => Peeked::EndArray,
            b'"' => Peeked::String,
            b't' => Peeked::True,
            b'f' => Peeked::False,
            b'n' => Peeked::Null,
            b'-' | b'0'..=b'9' => Peeked::Number,
            other => {
                return Err(syntax(
                    self.consumed + at as u64,
                    format!("unexpected character '{}'", other.escape_ascii()),
                ))
            }
        };
        self.advance(at);
        self.stack[top] = next_scope;
        Ok(peeked)
    }

    async fn value_len(&mut self, peeked: Peeked) -> Result<usize, ReaderError> {
        match peeked {
            Peeked::BeginObject | Peeked::BeginArray => self.container_len().await,
            Peeked::String => self.string_len().await,
            Peeked::Number | Peeked::True | Peeked::False | Peeked::Null => {
                self.scalar_token_len().await
            }
            other => Err(self.syntax_here(&format!("expected a value but found {}", other.kind()))),
        }
    }

    async fn container_len(&mut self) -> Result<usize, ReaderError> {
        let mut scanner = ContainerScanner::default();
        loop {
            if let Some(len) = scanner.scan(&self.buffer) {
                return Ok(len);
            }
            self.fill_more().await?;
        }
    }

    async fn string_len(&mut self) -> Result<usize, ReaderError> {
        let mut scanner = StringScanner::new();
        loop {
            if let Some(len) = scanner.scan(&self.buffer) {
                return Ok(len);
            }
            self.fill_more().await?;
        }
    }

    async fn scalar_token_len(&mut self) -> Result<usize, ReaderError> {
        loop {
            if let Some(len) = scalar_len(&self.buffer) {
                return Ok(len);
            }
            // the end of the body also terminates a scalar
            if self.eof || self.fill_buffer().await? == 0 {
                return Ok(self.buffer.len());
            }
        }
    }

    async fn read_string_token(&mut self) -> Result<String, ReaderError> {
        let len = self.string_len().await?;
        let value = decode_string(&self.buffer[..len], self.consumed)?;
        self.consume_peeked(len);
        Ok(value)
    }

    async fn read_scalar_token(&mut self) -> Result<String, ReaderError> {
        let len = self.scalar_token_len().await?;
        let text = std::str::from_utf8(&self.buffer[..len])
            .map_err(|e| syntax(self.consumed, format!("invalid UTF-8: {e}")))?
            .to_owned();
        self.consume_peeked(len);
        Ok(text)
    }

    fn unexpected(&self, expected: TokenKind, found: Peeked) -> ReaderError {
        ReaderError::UnexpectedToken {
            expected,
            found: found.kind(),
            offset: self.consumed,
        }
    }

    fn syntax_here(&self, message: &str) -> ReaderError {
        syntax(self.consumed, message.to_owned())
    }
}

fn syntax(offset: u64, message: String) -> ReaderError {
    ReaderError::Syntax { offset, message }
}

fn decode_string(token: &[u8], offset: u64) -> Result<String, ReaderError> {
    let inner = &token[1..token.len() - 1];
    if memchr(b'\\', inner).is_none() {
        return std::str::from_utf8(inner)
            .map(str::to_owned)
            .map_err(|e| syntax(offset, format!("invalid UTF-8 in string: {e}")));
    }
    let mut owned = token.to_vec();
    Ok(simd_json::from_slice::<String>(&mut owned)?)
}
