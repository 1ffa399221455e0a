use futures::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use log::trace;

use crate::{Error, NL};

const CR: u8 = b'\r';

/// The default size of the buffer used by [`RawSplitter`].
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Splits a byte source into lines.
///
/// Each line is produced without its line terminator (`\n` or `\r\n`).
/// A final line with no terminator is still produced.
pub struct LineSplitter<R> {
    reader: R,
    line: Vec<u8>,
    max_line: Option<usize>,
    err: Option<Error>,
    done: bool,
}

impl<R: AsyncBufRead + Unpin + Send> LineSplitter<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            max_line: None,
            err: None,
            done: false,
        }
    }

    /// Refuse lines longer than `max` bytes, not counting the terminator.
    #[must_use]
    pub fn with_max_line(mut self, max: usize) -> Self {
        self.max_line = Some(max);
        self
    }

    async fn fill(&mut self) -> Result<usize, Error> {
        if let Some(max) = self.max_line {
            // Room for the longest permitted line plus CR LF.
            let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(2);
            let n = (&mut self.reader)
                .take(limit)
                .read_until(NL, &mut self.line)
                .await?;
            Ok(n)
        } else {
            Ok(self.reader.read_until(NL, &mut self.line).await?)
        }
    }

    /// Move to the next line.
    /// Returns `false` once the source is exhausted or has failed.
    pub async fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        self.line.clear();
        match self.fill().await {
            Ok(0) => {
                self.done = true;
                false
            }
            Ok(_) => {
                if self.line.last() == Some(&NL) {
                    self.line.pop();
                    if self.line.last() == Some(&CR) {
                        self.line.pop();
                    }
                }
                if let Some(limit) = self.max_line {
                    if self.line.len() > limit {
                        self.err = Some(Error::LineTooLong { limit });
                        self.done = true;
                        return false;
                    }
                }
                trace!("line of {} bytes", self.line.len());
                true
            }
            Err(e) => {
                self.err = Some(e);
                self.done = true;
                false
            }
        }
    }

    /// The current line.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.line
    }

    #[must_use]
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }
}

/// Splits a byte source into chunks of whatever a single read produces,
/// up to a fixed size.
pub struct RawSplitter<R> {
    reader: R,
    buf: Vec<u8>,
    chunk: Vec<u8>,
    err: Option<Error>,
    done: bool,
}

impl<R: AsyncRead + Unpin + Send> RawSplitter<R> {
    #[must_use]
    pub fn new(reader: R, size: usize) -> Self {
        Self {
            reader,
            buf: vec![0; size.max(1)],
            chunk: Vec::new(),
            err: None,
            done: false,
        }
    }

    /// Read the next chunk.  An empty read or an error ends the sequence.
    pub async fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        match self.reader.read(&mut self.buf).await {
            Ok(0) => {
                self.done = true;
                false
            }
            Ok(n) => {
                self.chunk = self.buf[..n].to_vec();
                true
            }
            Err(e) => {
                self.err = Some(Error::from(e));
                self.done = true;
                false
            }
        }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.chunk
    }

    /// Take the current chunk, leaving nothing in its place.
    pub fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.chunk)
    }

    #[must_use]
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    pub fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }
}
