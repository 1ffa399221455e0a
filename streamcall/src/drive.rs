use std::{any::Any, ops::ControlFlow};

use futures::{io::sink, AsyncReadExt};
use log::debug;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::{
    call::CONTENT_TYPE,
    codec::{raw_record, Codec, CodecRegistry},
    err::Res,
    stream::{NdjsonFactory, RawFactory, RecordStream, StreamFactory},
    BodyReader, Response,
};

/// Pull every record from `stream` and pass it to `f`.
///
/// This stops at the first error, or as soon as `f` breaks.  The stream,
/// and the byte source under it, is dropped before this returns.
pub async fn drain_to_callback<S, F>(mut stream: S, mut f: F) -> Res<()>
where
    S: RecordStream,
    F: FnMut(S::Item) -> ControlFlow<()>,
{
    let mut count = 0_usize;
    while stream.advance().await {
        if let Some(e) = stream.take_err() {
            debug!("stream failed after {count} records: {e}");
            return Err(e);
        }
        if let Some(v) = stream.take_current() {
            count += 1;
            if f(v).is_break() {
                debug!("consumer stopped after {count} records");
                return Ok(());
            }
        }
    }
    if let Some(e) = stream.take_err() {
        debug!("stream failed after {count} records: {e}");
        return Err(e);
    }
    debug!("stream finished after {count} records");
    Ok(())
}

/// Pull every record from `stream` and send it to `out`.
///
/// `out` is dropped when this finishes, however it finishes, so the
/// receiver sees the channel close exactly once.  If the receiver goes
/// away, this stops early without an error.
pub async fn drain_to_channel<S>(mut stream: S, out: mpsc::Sender<S::Item>) -> Res<()>
where
    S: RecordStream,
{
    while stream.advance().await {
        if let Some(e) = stream.take_err() {
            return Err(e);
        }
        if let Some(v) = stream.take_current() {
            if out.send(v).await.is_err() {
                debug!("receiver went away; stopping");
                return Ok(());
            }
        }
    }
    stream.take_err().map_or(Ok(()), Err)
}

/// Decode `body` with a stream from `factory`, passing records to `f`.
pub async fn read_stream<Fa, F>(body: BodyReader, factory: &Fa, f: F) -> Res<()>
where
    Fa: StreamFactory,
    F: FnMut(<Fa::Stream as RecordStream>::Item) -> ControlFlow<()>,
{
    drain_to_callback(factory.open(body), f).await
}

/// Decode `body` with a stream from `factory`, sending records to `out`.
pub async fn read_stream_to_channel<Fa: StreamFactory>(
    body: BodyReader,
    factory: &Fa,
    out: mpsc::Sender<<Fa::Stream as RecordStream>::Item>,
) -> Res<()> {
    drain_to_channel(factory.open(body), out).await
}

/// Decode `body` with the codec for `content_type`, passing records to `f`.
///
/// A JSON body is read whole and makes one record.  A JSON-each-row body is
/// decoded line by line as it arrives.  A raw body is passed on in chunks,
/// so `T` has to be `Vec<u8>`; anything else fails before the body is read.
pub async fn read_records<T, F>(
    body: BodyReader,
    codecs: &CodecRegistry,
    content_type: &str,
    mut f: F,
) -> Res<()>
where
    T: DeserializeOwned + Send + Any,
    F: FnMut(T) -> ControlFlow<()>,
{
    let codec = codecs.lookup(content_type)?;
    debug!("decoding {content_type:?} body as {codec:?}");
    match codec {
        Codec::Json => {
            let _ = f(read_json(body).await?);
            Ok(())
        }
        Codec::JsonEachRow => read_stream(body, &NdjsonFactory::<T>::new(), f).await,
        Codec::RawBytes => {
            raw_record::<T>(Vec::new())?;
            let mut failure = None;
            read_stream(body, &RawFactory::default(), |chunk| {
                match raw_record::<T>(chunk) {
                    Ok(v) => f(v),
                    Err(e) => {
                        failure = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })
            .await?;
            failure.map_or(Ok(()), Err)
        }
    }
}

/// Take the body of `res` and decode it according to its `content-type`.
/// A response without a content type is [`crate::Error::UnknownContentType`].
pub async fn read_response<R, T, F>(res: &mut R, codecs: &CodecRegistry, f: F) -> Res<()>
where
    R: Response + ?Sized,
    T: DeserializeOwned + Send + Any,
    F: FnMut(T) -> ControlFlow<()>,
{
    let content_type = res
        .headers()
        .get(CONTENT_TYPE)
        .unwrap_or_default()
        .to_owned();
    read_records(res.take_body(), codecs, &content_type, f).await
}

/// Read the whole body and decode it as one JSON document.
pub async fn read_json<T: DeserializeOwned>(body: BodyReader) -> Res<T> {
    let buf = read_body(body).await?;
    Ok(serde_json::from_slice(&buf)?)
}

/// Read the whole body.
pub async fn read_body(mut body: BodyReader) -> Res<Vec<u8>> {
    let mut buf = Vec::new();
    body.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Read and drop the whole body, returning how many bytes there were.
pub async fn discard_body(body: BodyReader) -> Res<u64> {
    Ok(futures::io::copy(body, &mut sink()).await?)
}

#[cfg(test)]
mod test {
    use std::ops::ControlFlow;

    use futures::io::{BufReader, Cursor};
    use serde::Deserialize;
    use tokio::sync::mpsc;

    use super::{
        discard_body, drain_to_callback, drain_to_channel, read_json, read_records, read_response,
        read_stream,
    };
    use crate::{
        test::init, BodyReader, CodecRegistry, Error, IncomingResponse, NdjsonFactory, NdjsonStream,
    };

    #[derive(Debug, Deserialize, PartialEq, Eq)]
    struct Pet {
        name: String,
    }

    const PETS: &[u8] = b"{\"name\":\"Pato\"}\n{\"name\":\"Lola\"}\n";

    fn body(b: &[u8]) -> BodyReader {
        Box::new(Cursor::new(b.to_vec()))
    }

    fn stream(b: &[u8]) -> NdjsonStream<BufReader<BodyReader>, Pet> {
        NdjsonStream::new(BufReader::new(body(b)))
    }

    #[tokio::test]
    async fn callback_sees_all() {
        init();
        let mut names = Vec::new();
        drain_to_callback(stream(PETS), |p| {
            names.push(p.name);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(names, vec!["Pato", "Lola"]);
    }

    #[tokio::test]
    async fn callback_stops_early() {
        init();
        let mut calls = 0;
        drain_to_callback(stream(PETS), |_| {
            calls += 1;
            ControlFlow::Break(())
        })
        .await
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn callback_not_called_after_error() {
        init();
        let mut calls = 0;
        let res = drain_to_callback(stream(b"{\"name\":\"Pato\"}\nnope\n{\"name\":\"Lola\"}\n"), |_| {
            calls += 1;
            ControlFlow::Continue(())
        })
        .await;
        assert!(matches!(res, Err(Error::Json(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn channel_closed_once() {
        init();
        let (tx, mut rx) = mpsc::channel(1);
        let driver = tokio::spawn(drain_to_channel(stream(PETS), tx));
        assert_eq!(rx.recv().await.map(|p| p.name), Some(String::from("Pato")));
        assert_eq!(rx.recv().await.map(|p| p.name), Some(String::from("Lola")));
        assert!(rx.recv().await.is_none());
        driver.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn channel_closed_on_error() {
        init();
        let (tx, mut rx) = mpsc::channel(4);
        let res = drain_to_channel(stream(b"{\"name\":\"Pato\"}\n{\n"), tx).await;
        assert!(res.is_err());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn factory() {
        init();
        let mut n = 0;
        read_stream(body(PETS), &NdjsonFactory::<Pet>::new(), |_| {
            n += 1;
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn whole_bodies() {
        init();
        let p: Pet = read_json(body(b"{\"name\":\"Pato\"}")).await.unwrap();
        assert_eq!(p.name, "Pato");
        assert_eq!(discard_body(body(PETS)).await.unwrap(), 32);
    }

    async fn names_by_type(content_type: &str, b: &[u8]) -> Vec<String> {
        let mut names = Vec::new();
        read_records(body(b), &CodecRegistry::default(), content_type, |p: Pet| {
            names.push(p.name);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        names
    }

    #[tokio::test]
    async fn records_by_content_type() {
        init();
        assert_eq!(
            names_by_type("application/jsoneachrow", PETS).await,
            vec!["Pato", "Lola"]
        );
        assert_eq!(
            names_by_type("application/json; charset=utf-8", b"{\"name\":\"Pato\"}").await,
            vec!["Pato"]
        );

        let mut raw = Vec::new();
        read_records(
            body(PETS),
            &CodecRegistry::default(),
            "application/octet-stream",
            |chunk: Vec<u8>| {
                raw.extend(chunk);
                ControlFlow::Continue(())
            },
        )
        .await
        .unwrap();
        assert_eq!(raw, PETS);
    }

    #[tokio::test]
    async fn records_rejected_before_reading() {
        init();
        let res = read_records(
            body(PETS),
            &CodecRegistry::default(),
            "application/octet-stream",
            |_: Pet| ControlFlow::Continue(()),
        )
        .await;
        assert!(matches!(res, Err(Error::TypeMismatch { .. })));

        let res = read_records(
            body(PETS),
            &CodecRegistry::default(),
            "text/plain",
            |_: Pet| ControlFlow::Continue(()),
        )
        .await;
        assert!(matches!(res, Err(Error::UnknownContentType(_))));
    }

    #[tokio::test]
    async fn response_by_header() {
        init();
        let mut res = IncomingResponse::new(200)
            .with_header("Content-Type", "application/x-ndjson")
            .with_body(PETS.to_vec());
        let mut names = Vec::new();
        read_response(&mut res, &CodecRegistry::default(), |p: Pet| {
            names.push(p.name);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        assert_eq!(names, vec!["Pato", "Lola"]);

        let mut bare = IncomingResponse::new(200).with_body(PETS.to_vec());
        let res = read_response(&mut bare, &CodecRegistry::default(), |_: Pet| {
            ControlFlow::Continue(())
        })
        .await;
        assert!(matches!(res, Err(Error::UnknownContentType(_))));
    }
}
