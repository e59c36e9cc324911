use bytes::{Buf, Bytes};
use futures::Stream;
use std::io::{Error as IoError, ErrorKind};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

use crate::body::ResponseBody;

/// Adapts a stream of byte chunks, such as an HTTP body, into an [`AsyncRead`].
///
/// Disconnecting drops the stream, which hands the connection back to its owner.
pub struct StreamToAsyncRead<S> {
    stream: Option<S>,
    buffer: Bytes,
}

impl<S> StreamToAsyncRead<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            buffer: Bytes::new(),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.stream.is_none()
    }
}

impl<S> AsyncRead for StreamToAsyncRead<S>
where
    S: Stream<Item = Result<Bytes, IoError>> + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        while self.buffer.is_empty() {
            let Some(stream) = self.stream.as_mut() else {
                return Poll::Ready(Err(IoError::new(
                    ErrorKind::NotConnected,
                    "response body was disconnected",
                )));
            };
            match Pin::new(stream).poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => self.buffer = data,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => return Poll::Ready(Ok(())), // EOF
                Poll::Pending => return Poll::Pending,
            }
        }

        let len = std::cmp::min(self.buffer.len(), buf.remaining());
        buf.put_slice(&self.buffer[..len]);
        self.buffer.advance(len);
        Poll::Ready(Ok(()))
    }
}

impl<S> ResponseBody for StreamToAsyncRead<S>
where
    S: Stream<Item = Result<Bytes, IoError>> + Unpin + Send,
{
    fn disconnect(&mut self) {
        self.stream = None;
        self.buffer.clear();
    }
}

#[cfg(feature = "http")]
pub type HttpBody = StreamToAsyncRead<futures::stream::BoxStream<'static, Result<Bytes, IoError>>>;

#[cfg(feature = "http")]
impl HttpBody {
    /// Takes ownership of a response and exposes its body for incremental reading.
    pub fn from_response(response: reqwest::Response) -> Self {
        use futures::{StreamExt, TryStreamExt};

        let stream = response
            .bytes_stream()
            .map_err(|e| IoError::new(ErrorKind::Other, e))
            .boxed();
        Self::new(stream)
    }
}
