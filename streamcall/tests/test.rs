// Rather than grapple with #[cfg(...)] for every variable and import.
#![cfg(all(feature = "csv", feature = "mock"))]

use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::io::Cursor;
use serde::{Deserialize, Serialize};
use streamcall::{
    delim::{Column, Quote, Schema, COMMA},
    read_body, read_response, read_stream, read_stream_to_channel, Call, ChannelSource,
    CodecRegistry, CsvFactory, Error, IncomingResponse, MockTransport, NdjsonFactory,
    OutgoingRequest, ReaderSource, Res, Response, SliceSource, Transport,
};
use tokio::{sync::mpsc, time::timeout};
use url::Url;
use tokio_util::sync::CancellationToken;

const URL: &str = "http://mock.test/pets";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Pet {
    name: String,
    age: u32,
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pets() -> Vec<Pet> {
    vec![
        Pet {
            name: String::from("Pato"),
            age: 3,
        },
        Pet {
            name: String::from("Lola"),
            age: 1,
        },
    ]
}

#[tokio::test]
async fn stream_ndjson_both_ways() {
    init();
    let transport = MockTransport::echo();
    let mut res = Call::post(URL)
        .unwrap()
        .content_type("application/x-ndjson")
        .stream_body(SliceSource::new(pets()))
        .expect_status(&[200])
        .execute(&transport)
        .await
        .unwrap();

    let captured = transport.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(
        captured[0].body,
        b"{\"name\":\"Pato\",\"age\":3}\n{\"name\":\"Lola\",\"age\":1}\n"
    );
    assert_eq!(
        captured[0].headers.get("Content-Type"),
        Some("application/x-ndjson")
    );

    let (tx, mut rx) = mpsc::channel(4);
    read_stream_to_channel(res.take_body(), &NdjsonFactory::<Pet>::new(), tx)
        .await
        .unwrap();
    let mut received = Vec::new();
    while let Some(p) = rx.recv().await {
        received.push(p);
    }
    assert_eq!(received, pets());
}

#[tokio::test]
async fn sniffer_cancels_after_first() {
    init();
    let transport = MockTransport::echo();
    let cancel = CancellationToken::new();
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let sniffed = Arc::clone(&chunks);
    let stop = cancel.clone();

    Call::post(URL)
        .unwrap()
        .content_type("application/jsoneachrow")
        .cancel_token(cancel)
        .sniffer(move |b: &[u8], e: Option<&Error>| {
            assert!(e.is_none());
            sniffed.lock().unwrap().push(b.to_vec());
            stop.cancel();
        })
        .stream_body(SliceSource::new(pets()))
        .execute(&transport)
        .await
        .unwrap();

    let first = b"{\"name\":\"Pato\",\"age\":3}\n".to_vec();
    assert_eq!(*chunks.lock().unwrap(), vec![first.clone()]);
    assert_eq!(transport.captured()[0].body, first);
}

#[tokio::test]
async fn producer_error_fails_call() {
    init();
    let transport = MockTransport::echo();
    let errors = Arc::new(Mutex::new(0));
    let counted = Arc::clone(&errors);
    let res = Call::post(URL)
        .unwrap()
        .content_type("application/octet-stream")
        .sniffer(move |_: &[u8], e: Option<&Error>| {
            if e.is_some() {
                *counted.lock().unwrap() += 1;
            }
        })
        .stream_body(SliceSource::new(pets()))
        .execute(&transport)
        .await;
    assert!(matches!(res, Err(Error::TypeMismatch { .. })));
    assert_eq!(*errors.lock().unwrap(), 1);
}

#[tokio::test]
async fn unknown_content_type_is_not_sent() {
    init();
    let transport = MockTransport::echo();
    let res = Call::post(URL)
        .unwrap()
        .content_type("text/csv")
        .stream_body(SliceSource::new(pets()))
        .execute(&transport)
        .await;
    assert!(matches!(res, Err(Error::UnknownContentType(_))));
    assert!(transport.captured().is_empty());
}

#[tokio::test]
async fn raw_reader_passes_through() {
    init();
    let transport = MockTransport::echo();
    let input = b"line one\nline two\n".to_vec();
    let mut res = Call::put(URL)
        .unwrap()
        .content_type("text/plain")
        .stream_body(ReaderSource::lines(Cursor::new(input.clone())))
        .execute(&transport)
        .await
        .unwrap();
    assert_eq!(read_body(res.take_body()).await.unwrap(), input);
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Repo {
    rank: i64,
    name: String,
    stars: i64,
}

#[tokio::test]
async fn csv_response_skips_header() {
    init();
    let transport = MockTransport::fixed(
        200,
        b"rank,repo_name,stars\n1,freeCodeCamp,341271\n2,996.ICU,261139",
    );
    let mut res = Call::get(URL).unwrap().execute(&transport).await.unwrap();

    let factory = CsvFactory::new(
        1,
        Schema::new(
            COMMA,
            vec![
                Column::int(Quote::None, |r: &mut Repo, v| r.rank = v),
                Column::string(Quote::None, |r: &mut Repo, v| r.name = v),
                Column::int(Quote::None, |r: &mut Repo, v| r.stars = v),
            ],
        ),
    );
    let mut rows = Vec::new();
    read_stream(res.take_body(), &factory, |r| {
        rows.push(r);
        ControlFlow::Continue(())
    })
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            Repo {
                rank: 1,
                name: String::from("freeCodeCamp"),
                stars: 341_271,
            },
            Repo {
                rank: 2,
                name: String::from("996.ICU"),
                stars: 261_139,
            },
        ]
    );
}

#[tokio::test]
async fn unexpected_status() {
    init();
    let transport = MockTransport::fixed(503, b"");
    let res = Call::get(URL)
        .unwrap()
        .expect_status(&[200, 201])
        .execute(&transport)
        .await;
    match res {
        Err(Error::UnexpectedStatusCode { want, have }) => {
            assert_eq!(want, vec![200, 201]);
            assert_eq!(have, 503);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("call should have failed"),
    }
}

#[tokio::test]
async fn assertion_failure() {
    init();
    let transport = MockTransport::new(|_| {
        IncomingResponse::new(200).with_header("content-type", "text/html")
    });
    let res = Call::get(URL)
        .unwrap()
        .assert_response(|r: &dyn Response| match r.headers().get("content-type") {
            Some("application/json") => Ok(()),
            other => Err(format!("content type was {other:?}")),
        })
        .execute(&transport)
        .await;
    assert!(matches!(res, Err(Error::AssertionFailed(_))));
}

#[tokio::test]
async fn request_options() {
    init();
    let transport = MockTransport::fixed(204, b"");
    Call::get("http://mock.test/api?page=1&sort=asc")
        .unwrap()
        .method("DELETE")
        .path("v1/pets/")
        .unwrap()
        .query("page", "2")
        .basic_auth("user", "pass")
        .header("x-trace", "a", false)
        .header("x-trace", "b", false)
        .content_type("application/json")
        .body(&pets()[0])
        .unwrap()
        .execute(&transport)
        .await
        .unwrap();

    let req = &transport.captured()[0];
    assert_eq!(req.method, "DELETE");
    assert_eq!(
        req.url.as_str(),
        "http://mock.test/api/v1/pets?sort=asc&page=2"
    );
    assert_eq!(
        req.headers.get("authorization"),
        Some("Basic dXNlcjpwYXNz")
    );
    assert_eq!(req.headers.get_all("x-trace").collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(req.body, b"{\"name\":\"Pato\",\"age\":3}");
}

#[tokio::test]
async fn echo_decoded_by_content_type() {
    init();
    let transport = MockTransport::echo();
    let mut res = Call::post(URL)
        .unwrap()
        .content_type("application/jsoneachrow")
        .stream_body(SliceSource::new(pets()))
        .execute(&transport)
        .await
        .unwrap();
    let mut received = Vec::new();
    read_response(&mut res, &CodecRegistry::default(), |p: Pet| {
        received.push(p);
        ControlFlow::Continue(())
    })
    .await
    .unwrap();
    assert_eq!(received, pets());
}

/// A transport that never gets a response.
struct Unreachable;

impl Transport for Unreachable {
    type Request = OutgoingRequest;
    type Response = IncomingResponse;

    fn request(&self, url: Url) -> OutgoingRequest {
        OutgoingRequest::new(url)
    }

    async fn send(&self, _req: OutgoingRequest) -> Res<IncomingResponse> {
        Err(Error::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn transport_error_stops_producer() {
    init();
    // The sender stays open, so only cancellation can end the producer.
    let (tx, rx) = mpsc::channel::<Pet>(4);
    let res = timeout(
        Duration::from_secs(5),
        Call::post(URL)
            .unwrap()
            .content_type("application/x-ndjson")
            .stream_body(ChannelSource::new(rx))
            .execute(&Unreachable),
    )
    .await
    .expect("call did not finish");
    let Err(Error::Transport(e)) = res else {
        panic!("expected a transport error");
    };
    assert_eq!(e.to_string(), "connection refused");
    drop(tx);
}
