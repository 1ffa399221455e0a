use std::{
    cmp::min,
    io::{Error as IoError, ErrorKind, Result as IoResult},
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use futures::{AsyncRead, AsyncWrite};
use log::trace;

use crate::{err::Res, Error};

#[derive(Default)]
struct Shared {
    buf: Vec<u8>,
    r: usize,
    closed: bool,
    reader_gone: bool,
    waker: Option<Waker>,
}

impl Shared {
    fn wake(&mut self) {
        if let Some(w) = self.waker.take() {
            w.wake();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory pipe with one writer and one reader.
///
/// Writes never block; the buffer grows until the reader catches up.
/// The reader sees the end of the stream once the writer is closed or
/// dropped and everything written has been read.
pub struct TransferBuffer;

impl TransferBuffer {
    #[allow(clippy::new_ret_no_self)]
    #[must_use]
    pub fn new() -> (TransferWriter, TransferReader) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            TransferWriter {
                shared: Arc::clone(&shared),
            },
            TransferReader { shared },
        )
    }
}

pub struct TransferWriter {
    shared: Arc<Mutex<Shared>>,
}

impl TransferWriter {
    /// Append `data` to the buffer.
    pub fn write_chunk(&mut self, data: &[u8]) -> Res<()> {
        let mut s = lock(&self.shared);
        if s.reader_gone || s.closed {
            return Err(Error::Io(IoError::from(ErrorKind::BrokenPipe)));
        }
        s.buf.extend_from_slice(data);
        trace!("buffered {} bytes", data.len());
        s.wake();
        Ok(())
    }

    /// Mark the end of the stream.  Closing more than once has no effect.
    pub fn close(&mut self) {
        let mut s = lock(&self.shared);
        if !s.closed {
            s.closed = true;
            s.wake();
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }
}

impl Drop for TransferWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsyncWrite for TransferWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<IoResult<usize>> {
        Poll::Ready(match self.write_chunk(buf) {
            Ok(()) => Ok(buf.len()),
            Err(Error::Io(e)) => Err(e),
            Err(e) => Err(IoError::other(e)),
        })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<IoResult<()>> {
        self.close();
        Poll::Ready(Ok(()))
    }
}

pub struct TransferReader {
    shared: Arc<Mutex<Shared>>,
}

impl Drop for TransferReader {
    fn drop(&mut self) {
        let mut s = lock(&self.shared);
        s.reader_gone = true;
        s.buf.clear();
        s.r = 0;
    }
}

impl AsyncRead for TransferReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<IoResult<usize>> {
        let mut s = lock(&self.shared);
        let available = s.buf.len() - s.r;
        if available > 0 {
            let amnt = min(buf.len(), available);
            let r = s.r;
            buf[..amnt].copy_from_slice(&s.buf[r..r + amnt]);
            s.r += amnt;
            if s.r == s.buf.len() {
                s.buf.clear();
                s.r = 0;
            }
            Poll::Ready(Ok(amnt))
        } else if s.closed {
            Poll::Ready(Ok(0))
        } else {
            s.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}
