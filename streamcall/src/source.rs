use std::{future::Future, ops::ControlFlow};

use futures::{io::BufReader, AsyncRead};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    err::Res,
    split::{LineSplitter, RawSplitter},
    NL,
};

/// An ordered source of values for a streamed request body.
///
/// `range` visits each element in order until the source is exhausted or
/// the visitor breaks.
pub trait Rangeable: Send + 'static {
    type Item: Serialize + Send + 'static;

    /// Whether elements have to be encoded before they are written.
    /// Sources of bytes that are already encoded return `false`.
    fn requires_encoding(&self) -> bool;

    fn range<F>(self, f: F) -> impl Future<Output = Res<()>> + Send
    where
        F: FnMut(usize, Self::Item) -> ControlFlow<()> + Send;
}

/// Values that are all in memory.
pub struct SliceSource<T> {
    items: Vec<T>,
}

impl<T> SliceSource<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> From<Vec<T>> for SliceSource<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T: Serialize + Send + 'static> Rangeable for SliceSource<T> {
    type Item = T;

    fn requires_encoding(&self) -> bool {
        true
    }

    async fn range<F>(self, mut f: F) -> Res<()>
    where
        F: FnMut(usize, T) -> ControlFlow<()> + Send,
    {
        for (i, x) in self.items.into_iter().enumerate() {
            if f(i, x).is_break() {
                break;
            }
            // Let other tasks, including the body reader, make progress.
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

/// Values received from a channel, until every sender is gone.
pub struct ChannelSource<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> ChannelSource<T> {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self { rx }
    }
}

impl<T: Serialize + Send + 'static> Rangeable for ChannelSource<T> {
    type Item = T;

    fn requires_encoding(&self) -> bool {
        true
    }

    async fn range<F>(mut self, mut f: F) -> Res<()>
    where
        F: FnMut(usize, T) -> ControlFlow<()> + Send,
    {
        let mut i = 0;
        while let Some(x) = self.rx.recv().await {
            if f(i, x).is_break() {
                self.rx.close();
                break;
            }
            i += 1;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Chunking {
    Lines,
    Raw(usize),
}

/// Bytes read from a reader, either line by line or in fixed-size chunks.
///
/// The bytes are passed through as they are, so this source needs no
/// encoding.  In line mode each element keeps its line terminator as `\n`.
pub struct ReaderSource<R> {
    reader: R,
    chunking: Chunking,
}

impl<R> ReaderSource<R> {
    #[must_use]
    pub fn lines(reader: R) -> Self {
        Self {
            reader,
            chunking: Chunking::Lines,
        }
    }

    #[must_use]
    pub fn raw(reader: R, size: usize) -> Self {
        Self {
            reader,
            chunking: Chunking::Raw(size),
        }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> Rangeable for ReaderSource<R> {
    type Item = Vec<u8>;

    fn requires_encoding(&self) -> bool {
        false
    }

    async fn range<F>(self, mut f: F) -> Res<()>
    where
        F: FnMut(usize, Vec<u8>) -> ControlFlow<()> + Send,
    {
        let mut i = 0;
        match self.chunking {
            Chunking::Lines => {
                let mut lines = LineSplitter::new(BufReader::new(self.reader));
                while lines.advance().await {
                    let mut line = lines.data().to_vec();
                    line.push(NL);
                    if f(i, line).is_break() {
                        return Ok(());
                    }
                    i += 1;
                }
                lines.take_err().map_or(Ok(()), Err)
            }
            Chunking::Raw(size) => {
                let mut chunks = RawSplitter::new(self.reader, size);
                while chunks.advance().await {
                    if f(i, chunks.take_data()).is_break() {
                        return Ok(());
                    }
                    i += 1;
                }
                chunks.take_err().map_or(Ok(()), Err)
            }
        }
    }
}
