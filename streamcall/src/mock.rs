use std::sync::{Arc, Mutex, PoisonError};

use futures::AsyncReadExt;
use log::debug;
use url::Url;

use crate::{
    err::Res,
    transport::{Headers, IncomingResponse, OutgoingRequest, Request, Transport},
};

/// A request as the mock transport received it, with its body read in full.
#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub url: Url,
    pub headers: Headers,
    pub body: Vec<u8>,
}

type Responder = Arc<dyn Fn(&CapturedRequest) -> IncomingResponse + Send + Sync>;

/// A transport that answers without going to the network.
///
/// The request body is read to the end before the response is made, so a
/// streamed body is fully produced by the time `send` returns.
#[derive(Clone)]
pub struct MockTransport {
    responder: Responder,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockTransport {
    /// Answer every request using `responder`.
    #[must_use]
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CapturedRequest) -> IncomingResponse + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            captured: Arc::default(),
        }
    }

    /// Answer every request with the same status and body.
    #[must_use]
    pub fn fixed(status: u16, body: &[u8]) -> Self {
        let body = body.to_vec();
        Self::new(move |_| IncomingResponse::new(status).with_body(body.clone()))
    }

    /// Answer with the request body, and its content type, if any.
    #[must_use]
    pub fn echo() -> Self {
        Self::new(|req| {
            let mut res = IncomingResponse::new(200).with_body(req.body.clone());
            if let Some(ct) = req.headers.get("content-type") {
                res = res.with_header("content-type", ct);
            }
            res
        })
    }

    /// Every request received so far, oldest first.
    #[must_use]
    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MockTransport {
    type Request = OutgoingRequest;
    type Response = IncomingResponse;

    fn request(&self, url: Url) -> OutgoingRequest {
        OutgoingRequest::new(url)
    }

    async fn send(&self, mut req: OutgoingRequest) -> Res<IncomingResponse> {
        let mut body = Vec::new();
        req.take_body()
            .into_reader()
            .read_to_end(&mut body)
            .await?;
        let (method, url, headers, _) = req.into_parts();
        debug!("mock {method} {url}: {} byte body", body.len());
        let captured = CapturedRequest {
            method,
            url,
            headers,
            body,
        };
        let res = (self.responder)(&captured);
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(captured);
        Ok(res)
    }
}
