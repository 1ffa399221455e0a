use std::ops::ControlFlow;

use log::{debug, trace, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::TransferWriter,
    codec::{Codec, CodecRegistry},
    err::Res,
    source::Rangeable,
    Error,
};

/// Observes every chunk the producer writes, along with any error from
/// encoding or writing that chunk.
pub type Sniffer = Box<dyn FnMut(&[u8], Option<&Error>) + Send>;

/// What a producer did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProduceReport {
    /// The number of elements that were encoded and written.
    pub records: usize,
    /// The number of bytes written.
    pub bytes: usize,
    /// Whether cancellation stopped the producer early.
    pub cancelled: bool,
}

/// Encode each element of `source` with `codec` and write it to `writer`.
///
/// Cancellation is checked before each element; a write that has started is
/// always finished.  The sniffer, if any, sees each chunk in the order it was
/// written.  `writer` is closed when this returns, whatever the outcome.
pub async fn encode_stream<S: Rangeable>(
    source: S,
    codec: Codec,
    mut writer: TransferWriter,
    mut sniffer: Option<Sniffer>,
    cancel: CancellationToken,
) -> Res<ProduceReport> {
    let mut report = ProduceReport::default();
    let mut failure = None;

    let visit = |i: usize, item: S::Item| {
        if cancel.is_cancelled() {
            report.cancelled = true;
            return ControlFlow::Break(());
        }
        let (bytes, err) = match codec.encode(&item) {
            Ok(b) => {
                let e = writer.write_chunk(&b).err();
                (b, e)
            }
            Err(e) => (Vec::new(), Some(e)),
        };
        if let Some(s) = sniffer.as_mut() {
            s(&bytes, err.as_ref());
        }
        if let Some(e) = err {
            warn!("element {i} was not written: {e}");
            failure = Some(e);
            return ControlFlow::Break(());
        }
        trace!("element {i}: {} bytes", bytes.len());
        report.records += 1;
        report.bytes += bytes.len();
        ControlFlow::Continue(())
    };

    let ranged = tokio::select! {
        res = source.range(visit) => Some(res),
        () = cancel.cancelled() => None,
    };
    writer.close();

    if ranged.is_none() {
        report.cancelled = true;
    }
    debug!(
        "producer finished: {} records, {} bytes, cancelled: {}",
        report.records, report.bytes, report.cancelled
    );
    if let Some(e) = failure {
        return Err(e);
    }
    ranged.unwrap_or(Ok(()))?;
    Ok(report)
}

/// A producer that has been started in a background task.
pub struct ProducerHandle {
    task: JoinHandle<Res<ProduceReport>>,
    cancel: CancellationToken,
}

impl ProducerHandle {
    /// Ask the producer to stop before its next element.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the producer to finish.
    pub async fn wait(self) -> Res<ProduceReport> {
        match self.task.await {
            Ok(res) => res,
            Err(e) => Err(Error::Producer(e.to_string())),
        }
    }
}

/// Start a background task that runs [`encode_stream`].
///
/// Sources that need encoding use the codec for `content_type`; this fails
/// before anything is started if there is no such codec.  Other sources are
/// written as raw bytes.
pub fn spawn_producer<S: Rangeable>(
    source: S,
    codecs: &CodecRegistry,
    content_type: Option<&str>,
    writer: TransferWriter,
    sniffer: Option<Sniffer>,
    cancel: CancellationToken,
) -> Res<ProducerHandle> {
    let codec = if source.requires_encoding() {
        codecs.lookup(content_type.unwrap_or_default())?
    } else {
        Codec::RawBytes
    };
    debug!("starting producer with {codec:?}");
    let task = tokio::spawn(encode_stream(
        source,
        codec,
        writer,
        sniffer,
        cancel.clone(),
    ));
    Ok(ProducerHandle { task, cancel })
}
