use std::{future::Future, marker::PhantomData};

#[cfg(feature = "csv")]
use std::sync::Arc;

#[cfg(feature = "csv")]
use delim::Schema;
use futures::{io::BufReader, AsyncBufRead, AsyncRead};
use log::trace;
use serde::de::DeserializeOwned;

use crate::{
    split::{LineSplitter, RawSplitter, DEFAULT_CHUNK_SIZE},
    BodyReader, Error,
};

/// A single-pass cursor over the records of a byte source.
///
/// After [`RecordStream::advance`] returns `true`, either a record or an
/// error is available.  Once it returns `false` the stream is finished and
/// [`RecordStream::err`] says whether that was because of a failure.
pub trait RecordStream: Send {
    type Item: Send;

    fn advance(&mut self) -> impl Future<Output = bool> + Send;

    fn current(&self) -> Option<&Self::Item>;

    fn take_current(&mut self) -> Option<Self::Item>;

    fn err(&self) -> Option<&Error>;

    fn take_err(&mut self) -> Option<Error>;
}

/// Decodes one JSON document from each line.
///
/// Lines that hold only whitespace are skipped.  A line that fails to decode
/// leaves an error in place of the record, but does not stop the stream.
pub struct NdjsonStream<R, T> {
    lines: LineSplitter<R>,
    current: Option<T>,
    err: Option<Error>,
}

impl<R: AsyncBufRead + Unpin + Send, T> NdjsonStream<R, T> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::from_lines(LineSplitter::new(reader))
    }

    #[must_use]
    pub fn from_lines(lines: LineSplitter<R>) -> Self {
        Self {
            lines,
            current: None,
            err: None,
        }
    }
}

impl<R, T> RecordStream for NdjsonStream<R, T>
where
    R: AsyncBufRead + Unpin + Send,
    T: DeserializeOwned + Send,
{
    type Item = T;

    async fn advance(&mut self) -> bool {
        self.current = None;
        self.err = None;
        while self.lines.advance().await {
            let line = self.lines.data();
            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice(line) {
                Ok(v) => self.current = Some(v),
                Err(e) => {
                    trace!("undecodable line: {e}");
                    self.err = Some(e.into());
                }
            }
            return true;
        }
        false
    }

    fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }

    fn err(&self) -> Option<&Error> {
        self.err.as_ref().or_else(|| self.lines.err())
    }

    fn take_err(&mut self) -> Option<Error> {
        self.err.take().or_else(|| self.lines.take_err())
    }
}

/// Parses delimited records, one per line, after skipping a number of
/// leading lines (usually a header).  Blank lines are skipped.
#[cfg(feature = "csv")]
pub struct CsvStream<R, T> {
    lines: LineSplitter<R>,
    schema: Arc<Schema<T>>,
    skip: usize,
    rows: usize,
    current: Option<T>,
    err: Option<Error>,
}

#[cfg(feature = "csv")]
impl<R: AsyncBufRead + Unpin + Send, T> CsvStream<R, T> {
    #[must_use]
    pub fn new(reader: R, skip: usize, schema: Arc<Schema<T>>) -> Self {
        Self {
            lines: LineSplitter::new(reader),
            schema,
            skip,
            rows: 0,
            current: None,
            err: None,
        }
    }

    /// The number of rows parsed successfully so far.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[cfg(feature = "csv")]
impl<R, T> RecordStream for CsvStream<R, T>
where
    R: AsyncBufRead + Unpin + Send,
    T: Default + Send,
{
    type Item = T;

    async fn advance(&mut self) -> bool {
        self.current = None;
        self.err = None;
        while self.skip > 0 {
            self.skip -= 1;
            if !self.lines.advance().await {
                return false;
            }
        }
        while self.lines.advance().await {
            let line = self.lines.data();
            if line.trim_ascii().is_empty() {
                continue;
            }
            match self.schema.parse_new(line) {
                Ok(v) => {
                    self.rows += 1;
                    self.current = Some(v);
                }
                Err(e) => self.err = Some(e.into()),
            }
            return true;
        }
        false
    }

    fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<T> {
        self.current.take()
    }

    fn err(&self) -> Option<&Error> {
        self.err.as_ref().or_else(|| self.lines.err())
    }

    fn take_err(&mut self) -> Option<Error> {
        self.err.take().or_else(|| self.lines.take_err())
    }
}

/// Passes chunks of the source through as they are read.
pub struct RawStream<R> {
    chunks: RawSplitter<R>,
    current: Option<Vec<u8>>,
}

impl<R: AsyncRead + Unpin + Send> RawStream<R> {
    #[must_use]
    pub fn new(reader: R, size: usize) -> Self {
        Self {
            chunks: RawSplitter::new(reader, size),
            current: None,
        }
    }
}

impl<R: AsyncRead + Unpin + Send> RecordStream for RawStream<R> {
    type Item = Vec<u8>;

    async fn advance(&mut self) -> bool {
        self.current = None;
        if self.chunks.advance().await {
            self.current = Some(self.chunks.take_data());
            true
        } else {
            false
        }
    }

    fn current(&self) -> Option<&Vec<u8>> {
        self.current.as_ref()
    }

    fn take_current(&mut self) -> Option<Vec<u8>> {
        self.current.take()
    }

    fn err(&self) -> Option<&Error> {
        self.chunks.err()
    }

    fn take_err(&mut self) -> Option<Error> {
        self.chunks.take_err()
    }
}

/// Creates a stream over a response body.
pub trait StreamFactory {
    type Stream: RecordStream;

    fn open(&self, body: BodyReader) -> Self::Stream;
}

/// Opens bodies as [`NdjsonStream`]s.
pub struct NdjsonFactory<T> {
    max_line: Option<usize>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> NdjsonFactory<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_line: None,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn with_max_line(mut self, max: usize) -> Self {
        self.max_line = Some(max);
        self
    }
}

impl<T> Default for NdjsonFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send> StreamFactory for NdjsonFactory<T> {
    type Stream = NdjsonStream<BufReader<BodyReader>, T>;

    fn open(&self, body: BodyReader) -> Self::Stream {
        let mut lines = LineSplitter::new(BufReader::new(body));
        if let Some(max) = self.max_line {
            lines = lines.with_max_line(max);
        }
        NdjsonStream::from_lines(lines)
    }
}

/// Opens bodies as [`CsvStream`]s that share one schema.
#[cfg(feature = "csv")]
pub struct CsvFactory<T> {
    skip: usize,
    schema: Arc<Schema<T>>,
}

#[cfg(feature = "csv")]
impl<T> CsvFactory<T> {
    #[must_use]
    pub fn new(skip: usize, schema: Schema<T>) -> Self {
        Self {
            skip,
            schema: Arc::new(schema),
        }
    }
}

#[cfg(feature = "csv")]
impl<T: Default + Send> StreamFactory for CsvFactory<T> {
    type Stream = CsvStream<BufReader<BodyReader>, T>;

    fn open(&self, body: BodyReader) -> Self::Stream {
        CsvStream::new(BufReader::new(body), self.skip, Arc::clone(&self.schema))
    }
}

/// Opens bodies as [`RawStream`]s.
pub struct RawFactory {
    size: usize,
}

impl RawFactory {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Default for RawFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamFactory for RawFactory {
    type Stream = RawStream<BodyReader>;

    fn open(&self, body: BodyReader) -> Self::Stream {
        RawStream::new(body, self.size)
    }
}

#[cfg(test)]
mod test {
    use futures::io::Cursor;
    use serde::Deserialize;

    use super::{NdjsonStream, RawStream, RecordStream};
    use crate::{test::init, Error};

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Pet {
        name: String,
        age: u32,
    }

    #[tokio::test]
    async fn ndjson_records() {
        init();
        let body = b"{\"name\":\"Pato\",\"age\":3}\n\n{\"name\":\"Lola\",\"age\":1}\n".to_vec();
        let mut s = NdjsonStream::<_, Pet>::new(Cursor::new(body));
        assert!(s.advance().await);
        assert_eq!(s.current().map(|p| p.name.as_str()), Some("Pato"));
        assert!(s.advance().await);
        assert_eq!(
            s.take_current(),
            Some(Pet {
                name: String::from("Lola"),
                age: 1
            })
        );
        assert!(!s.advance().await);
        assert!(s.err().is_none());
    }

    #[tokio::test]
    async fn ndjson_bad_line_keeps_going() {
        init();
        let body = b"{\"name\":\"Pato\"\n{\"name\":\"Lola\",\"age\":1}\n".to_vec();
        let mut s = NdjsonStream::<_, Pet>::new(Cursor::new(body));
        assert!(s.advance().await);
        assert!(s.current().is_none());
        assert!(matches!(s.err(), Some(Error::Json(_))));
        assert!(s.advance().await);
        assert!(s.err().is_none());
        assert_eq!(s.current().map(|p| p.age), Some(1));
    }

    #[tokio::test]
    async fn raw_passthrough() {
        init();
        let mut s = RawStream::new(Cursor::new(b"0123456789".to_vec()), 4);
        let mut all = Vec::new();
        while s.advance().await {
            all.extend(s.take_current().unwrap());
        }
        assert_eq!(all, b"0123456789");
    }

    #[cfg(feature = "csv")]
    mod csv {
        use std::sync::Arc;

        use delim::{Column, Quote, Schema, COMMA};
        use futures::io::Cursor;

        use super::super::{CsvStream, RecordStream};
        use crate::{test::init, Error};

        #[derive(Debug, Default)]
        struct Repo {
            rank: i64,
            name: String,
        }

        fn schema() -> Arc<Schema<Repo>> {
            Arc::new(Schema::new(
                COMMA,
                vec![
                    Column::int(Quote::None, |r: &mut Repo, v| r.rank = v),
                    Column::string(Quote::None, |r: &mut Repo, v| r.name = v),
                ],
            ))
        }

        #[tokio::test]
        async fn skips_header() {
            init();
            let body = b"rank,name\n1,a\n2,b\n".to_vec();
            let mut s = CsvStream::new(Cursor::new(body), 1, schema());
            let mut names = Vec::new();
            while s.advance().await {
                assert!(s.err().is_none());
                names.push(s.take_current().unwrap().name);
            }
            assert_eq!(names, vec!["a", "b"]);
            assert_eq!(s.rows(), 2);
        }

        #[tokio::test]
        async fn bad_row_counted_out() {
            init();
            let body = b"x,a\n2,b\n".to_vec();
            let mut s = CsvStream::new(Cursor::new(body), 0, schema());
            assert!(s.advance().await);
            assert!(matches!(s.err(), Some(Error::Delim(_))));
            assert!(s.current().is_none());
            assert!(s.advance().await);
            assert_eq!(s.current().map(|r| r.rank), Some(2));
            assert_eq!(s.rows(), 1);
        }
    }
}
