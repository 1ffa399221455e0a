use std::any::Any;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::{ParseError, Url};

use crate::{
    buffer::{TransferBuffer, TransferWriter},
    codec::CodecRegistry,
    err::Res,
    produce::{spawn_producer, ProducerHandle, Sniffer},
    source::Rangeable,
    transport::{BodyReader, Headers, Request, Response, StatusCode, Transport},
    Error,
};

pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_LENGTH: &str = "content-length";
pub const AUTHORIZATION: &str = "authorization";

type StartProducer = Box<
    dyn FnOnce(
            &CodecRegistry,
            Option<&str>,
            TransferWriter,
            Option<Sniffer>,
            CancellationToken,
        ) -> Res<ProducerHandle>
        + Send,
>;

type Assertion = Box<dyn Fn(&dyn Response) -> Result<(), String> + Send + Sync>;

enum CallBody {
    Empty,
    Bytes(Vec<u8>),
    Reader {
        reader: BodyReader,
        size: Option<u64>,
    },
    Stream(StartProducer),
}

/// A single HTTP exchange.
///
/// A `Call` is built up and then consumed by [`Call::execute`], so nothing
/// about it can change once the request is on its way.
///
/// With a streamed body, the records are encoded and written by a background
/// task while the transport sends the request.  `execute` does not return
/// until that task is done.  An error from encoding or writing the body is
/// returned from `execute`, as well as being shown to the sniffer.
pub struct Call {
    method: String,
    url: Url,
    headers: Headers,
    content_type: Option<String>,
    codecs: CodecRegistry,
    body: CallBody,
    sniffer: Option<Sniffer>,
    cancel: CancellationToken,
    expected: Option<Vec<StatusCode>>,
    assertions: Vec<Assertion>,
}

impl Call {
    pub fn new(method: &str, url: &str) -> Res<Self> {
        Ok(Self {
            method: method.to_owned(),
            url: Url::parse(url)?,
            headers: Headers::new(),
            content_type: None,
            codecs: CodecRegistry::default(),
            body: CallBody::Empty,
            sniffer: None,
            cancel: CancellationToken::new(),
            expected: None,
            assertions: Vec::new(),
        })
    }

    pub fn get(url: &str) -> Res<Self> {
        Self::new("GET", url)
    }

    pub fn post(url: &str) -> Res<Self> {
        Self::new("POST", url)
    }

    pub fn put(url: &str) -> Res<Self> {
        Self::new("PUT", url)
    }

    #[must_use]
    pub fn method(mut self, method: &str) -> Self {
        method.clone_into(&mut self.method);
        self
    }

    /// Add a header field.  With `replace`, any existing fields with the same
    /// name are removed first.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str, replace: bool) -> Self {
        if replace {
            self.headers.set(name, value);
        } else {
            self.headers.add(name, value);
        }
        self
    }

    #[must_use]
    pub fn basic_auth(self, user: &str, pass: &str) -> Self {
        let token = STANDARD.encode(format!("{user}:{pass}"));
        self.header(AUTHORIZATION, &format!("Basic {token}"), true)
    }

    /// Set a query parameter, replacing any with the same name.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        let others: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(n, _)| n != name)
            .map(|(n, v)| (n.into_owned(), v.into_owned()))
            .collect();
        self.url
            .query_pairs_mut()
            .clear()
            .extend_pairs(others)
            .append_pair(name, value);
        self
    }

    /// Append path segments to the URL.
    pub fn path(mut self, path: &str) -> Res<Self> {
        self.url
            .path_segments_mut()
            .map_err(|()| Error::Url(ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(self)
    }

    /// Set the content type of the request body.  This also picks the codec
    /// for [`Call::body`] and [`Call::stream_body`], so set it first.
    #[must_use]
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    #[must_use]
    pub fn content_length(self, len: u64) -> Self {
        self.header(CONTENT_LENGTH, &len.to_string(), true)
    }

    /// Replace the table used to find codecs.
    #[must_use]
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Encode `v` as the body, using the codec for the content type.
    pub fn body<T: Serialize + Any>(mut self, v: &T) -> Res<Self> {
        let ct = self.content_type.as_deref().unwrap_or_default();
        self.body = CallBody::Bytes(self.codecs.encode(ct, v)?);
        Ok(self)
    }

    #[must_use]
    pub fn raw_body(mut self, body: Vec<u8>) -> Self {
        self.body = CallBody::Bytes(body);
        self
    }

    /// Send whatever `reader` produces, as it is.
    #[must_use]
    pub fn body_reader(mut self, reader: BodyReader, size: Option<u64>) -> Self {
        self.body = CallBody::Reader { reader, size };
        self
    }

    /// Produce the body from `source` while the request is being sent.
    #[must_use]
    pub fn stream_body<S: Rangeable>(mut self, source: S) -> Self {
        self.body = CallBody::Stream(Box::new(
            move |codecs: &CodecRegistry,
                  ct: Option<&str>,
                  writer: TransferWriter,
                  sniffer: Option<Sniffer>,
                  cancel: CancellationToken| {
                spawn_producer(source, codecs, ct, writer, sniffer, cancel)
            },
        ));
        self
    }

    /// Watch each chunk of a streamed body as it is written.
    #[must_use]
    pub fn sniffer<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8], Option<&Error>) + Send + 'static,
    {
        self.sniffer = Some(Box::new(f));
        self
    }

    /// Use `cancel` to stop a streamed body early.
    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fail unless the response status is one of `codes`.
    #[must_use]
    pub fn expect_status(mut self, codes: &[StatusCode]) -> Self {
        self.expected = Some(codes.to_vec());
        self
    }

    /// Check the response with `f`, failing with its message.
    #[must_use]
    pub fn assert_response<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Response) -> Result<(), String> + Send + Sync + 'static,
    {
        self.assertions.push(Box::new(f));
        self
    }

    /// Send the request and return the response.
    ///
    /// A streamed body's producer task is spawned before the transport is
    /// given the request, so it can begin writing into the transfer buffer
    /// before anything reads from it.  The buffer is unbounded, so this only
    /// means records are queued early.  If the transport fails, the producer
    /// is cancelled and the transport's error is returned.
    pub async fn execute<T: Transport>(self, transport: &T) -> Res<T::Response> {
        let Self {
            method,
            url,
            headers,
            content_type,
            codecs,
            body,
            sniffer,
            cancel,
            expected,
            assertions,
        } = self;

        debug!("{method} {url}");
        let mut req = transport.request(url);
        req.set_method(&method);
        for (n, v) in headers.iter() {
            req.headers_mut().add(n, v);
        }
        if let Some(ct) = content_type.as_deref() {
            req.headers_mut().set(CONTENT_TYPE, ct);
        }

        let producer = match body {
            CallBody::Empty => None,
            CallBody::Bytes(b) => {
                req.set_body(b);
                None
            }
            CallBody::Reader { reader, size } => {
                req.set_body_stream(reader, size);
                None
            }
            CallBody::Stream(start) => {
                let (writer, reader) = TransferBuffer::new();
                let handle = start(&codecs, content_type.as_deref(), writer, sniffer, cancel)?;
                req.set_body_stream(Box::new(reader), None);
                Some(handle)
            }
        };

        let sent = transport.send(req).await;
        if let Some(p) = producer {
            if sent.is_err() {
                p.cancel();
            }
            match (p.wait().await, &sent) {
                (Ok(report), _) => debug!("body produced: {report:?}"),
                (Err(e), Ok(_)) => return Err(e),
                (Err(e), Err(_)) => warn!("body producer also failed: {e}"),
            }
        }
        let res = sent?;

        if let Some(want) = expected {
            let have = res.status();
            if !want.contains(&have) {
                return Err(Error::UnexpectedStatusCode { want, have });
            }
        }
        for check in &assertions {
            check(&res as &dyn Response).map_err(Error::AssertionFailed)?;
        }
        Ok(res)
    }
}
