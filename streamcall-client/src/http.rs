use std::{
    io,
    pin::Pin,
    sync::{Mutex, PoisonError},
    task::{Context, Poll},
};

use futures::{AsyncRead, TryStreamExt};
use log::debug;
use reqwest::{Client, Method};
use streamcall::{
    Body, BodyReader, Error, IncomingResponse, OutgoingRequest, Res, Transport, CONTENT_LENGTH,
};
use tokio_util::{compat::FuturesAsyncReadCompatExt, io::ReaderStream};
use url::Url;

fn transport_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
    Error::Transport(Box::new(e))
}

/// reqwest wants a body stream that is `Sync`.  The reader is only ever
/// used through `&mut`, so the lock is never contended.
struct SyncBody(Mutex<BodyReader>);

impl AsyncRead for SyncBody {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let r = self
            .get_mut()
            .0
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        Pin::new(r).poll_read(cx, buf)
    }
}

/// A [`Transport`] that uses `reqwest`.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    type Request = OutgoingRequest;
    type Response = IncomingResponse;

    fn request(&self, url: Url) -> OutgoingRequest {
        OutgoingRequest::new(url)
    }

    async fn send(&self, req: OutgoingRequest) -> Res<IncomingResponse> {
        let (method, url, headers, body) = req.into_parts();
        let method = Method::from_bytes(method.as_bytes()).map_err(transport_error)?;
        let mut builder = self.client.request(method, url);
        for (n, v) in headers.iter() {
            builder = builder.header(n, v);
        }
        builder = match body {
            Body::Empty => builder,
            Body::Bytes(b) => builder.body(b),
            Body::Stream { reader, size } => {
                if let Some(len) = size {
                    builder = builder.header(CONTENT_LENGTH, len);
                }
                let stream = ReaderStream::new(SyncBody(Mutex::new(reader)).compat());
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let res = builder.send().await.map_err(transport_error)?;
        debug!("response status {}", res.status());
        let mut out = IncomingResponse::new(res.status().as_u16());
        for (n, v) in res.headers() {
            if let Ok(v) = v.to_str() {
                out = out.with_header(n.as_str(), v);
            }
        }
        let body = Box::pin(res.bytes_stream().map_err(io::Error::other)).into_async_read();
        Ok(out.with_reader(Box::new(body)))
    }
}
