use bytes::{Buf, Bytes};
use std::io::{Cursor, Error as IoError, ErrorKind};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// An open response body owned by a streaming result.
///
/// `disconnect` releases whatever connection backs the body. Reads after a disconnect
/// must fail or report end of input; they must never block.
pub trait ResponseBody: AsyncRead + Unpin + Send {
    fn disconnect(&mut self);
}

/// Body fed chunk by chunk through a channel.
pub struct ChannelBody {
    rx: mpsc::Receiver<Bytes>,
    buffer: Bytes,
    disconnected: bool,
}

impl ChannelBody {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            buffer: Bytes::new(),
            disconnected: false,
        }
    }

    /// Creates a body together with the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl AsyncRead for ChannelBody {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), IoError>> {
        if self.disconnected {
            return Poll::Ready(Err(IoError::new(
                ErrorKind::NotConnected,
                "response body was disconnected",
            )));
        }
        while self.buffer.is_empty() {
            match Pin::new(&mut self.rx).poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.buffer = chunk,
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }

        let to_copy = std::cmp::min(self.buffer.len(), buf.remaining());
        buf.put_slice(&self.buffer[..to_copy]);
        self.buffer.advance(to_copy);
        Poll::Ready(Ok(()))
    }
}

impl ResponseBody for ChannelBody {
    fn disconnect(&mut self) {
        self.disconnected = true;
        self.buffer.clear();
        self.rx.close();
    }
}

impl ResponseBody for Cursor<Vec<u8>> {
    fn disconnect(&mut self) {
        let end = self.get_ref().len() as u64;
        self.set_position(end);
    }
}

impl ResponseBody for &'static [u8] {
    fn disconnect(&mut self) {
        *self = &[];
    }
}
