use std::future::Future;

use futures::{
    io::{empty, Cursor},
    AsyncRead,
};
use url::Url;

use crate::err::Res;

/// A readable body.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

pub type StatusCode = u16;

/// An ordered list of header fields.  Names are compared without regard to
/// case, and are stored as they were given.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping any that have the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Replace all fields that have this name with a single field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.fields.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The value of the first field with this name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The body of an outgoing request.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    /// A body that is read as it is sent.  `size` is the length, if known.
    Stream { reader: BodyReader, size: Option<u64> },
}

impl Body {
    #[must_use]
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(b) => u64::try_from(b.len()).ok(),
            Self::Stream { size, .. } => *size,
        }
    }

    #[must_use]
    pub fn into_reader(self) -> BodyReader {
        match self {
            Self::Empty => Box::new(empty()),
            Self::Bytes(b) => Box::new(Cursor::new(b)),
            Self::Stream { reader, .. } => reader,
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Body::Empty"),
            Self::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Self::Stream { size, .. } => write!(f, "Body::Stream({size:?})"),
        }
    }
}

/// What a transport needs from a request.
pub trait Request: Send {
    fn method(&self) -> &str;
    fn set_method(&mut self, method: &str);
    fn url(&self) -> &Url;
    fn set_url(&mut self, url: Url);
    fn headers(&self) -> &Headers;
    fn headers_mut(&mut self) -> &mut Headers;
    fn set_body(&mut self, body: Vec<u8>);
    fn set_body_stream(&mut self, reader: BodyReader, size: Option<u64>);
    fn take_body(&mut self) -> Body;
}

/// What a transport produces as a response.
pub trait Response: Send {
    fn status(&self) -> StatusCode;
    fn set_status(&mut self, status: StatusCode);
    fn headers(&self) -> &Headers;
    fn headers_mut(&mut self) -> &mut Headers;
    /// Take the body.  The body can only be taken once; after that an empty
    /// body is returned.
    fn take_body(&mut self) -> BodyReader;
    fn set_body(&mut self, body: BodyReader);
}

/// Something that can carry a request and return a response.
///
/// A streamed request body is being written while `send` runs, so a
/// transport has to read the body concurrently with the rest of its work.
pub trait Transport: Send + Sync {
    type Request: Request;
    type Response: Response;

    fn request(&self, url: Url) -> Self::Request;

    fn send(&self, req: Self::Request) -> impl Future<Output = Res<Self::Response>> + Send;
}

/// A plain request that transports can convert into their own form.
#[derive(Debug)]
pub struct OutgoingRequest {
    method: String,
    url: Url,
    headers: Headers,
    body: Body,
}

impl OutgoingRequest {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            method: String::from("GET"),
            url,
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    /// Split into the method, URL, headers and body.
    #[must_use]
    pub fn into_parts(self) -> (String, Url, Headers, Body) {
        (self.method, self.url, self.headers, self.body)
    }
}

impl Request for OutgoingRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn set_method(&mut self, method: &str) {
        method.clone_into(&mut self.method);
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn set_body(&mut self, body: Vec<u8>) {
        self.body = Body::Bytes(body);
    }

    fn set_body_stream(&mut self, reader: BodyReader, size: Option<u64>) {
        self.body = Body::Stream { reader, size };
    }

    fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }
}

/// A plain response.
pub struct IncomingResponse {
    status: StatusCode,
    headers: Headers,
    body: Option<BodyReader>,
}

impl IncomingResponse {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.add(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(Box::new(Cursor::new(body)));
        self
    }

    #[must_use]
    pub fn with_reader(mut self, body: BodyReader) -> Self {
        self.body = Some(body);
        self
    }
}

impl Response for IncomingResponse {
    fn status(&self) -> StatusCode {
        self.status
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn take_body(&mut self) -> BodyReader {
        self.body.take().unwrap_or_else(|| Box::new(empty()))
    }

    fn set_body(&mut self, body: BodyReader) {
        self.body = Some(body);
    }
}
