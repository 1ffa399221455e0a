//
// License CC0: https://creativecommons.org/publicdomain/zero/1.0/
//

#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Too lazy to document.

//! Records in, records out, over HTTP bodies that are never held whole.
//!
//! Outgoing bodies are produced by a background task that encodes records
//! from a [`Rangeable`] source while the [`Transport`] is sending.  Incoming
//! bodies are read as a [`RecordStream`] of decoded records.

mod buffer;
mod call;
mod codec;
mod drive;
mod err;
#[cfg(feature = "mock")]
mod mock;
mod produce;
mod source;
mod split;
mod stream;
mod transport;

pub use buffer::{TransferBuffer, TransferReader, TransferWriter};
pub use call::{Call, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
pub use codec::{
    Codec, CodecRegistry, CONTENT_TYPE_JSON, CONTENT_TYPE_JSON_EACH_ROW, CONTENT_TYPE_NDJSON,
    CONTENT_TYPE_OCTET_STREAM,
};
pub use drive::{
    discard_body, drain_to_callback, drain_to_channel, read_body, read_json, read_records,
    read_response, read_stream, read_stream_to_channel,
};
pub use err::{Error, Res};
#[cfg(feature = "mock")]
pub use mock::{CapturedRequest, MockTransport};
pub use produce::{encode_stream, spawn_producer, ProduceReport, ProducerHandle, Sniffer};
pub use source::{ChannelSource, Rangeable, ReaderSource, SliceSource};
pub use split::{LineSplitter, RawSplitter, DEFAULT_CHUNK_SIZE};
#[cfg(feature = "csv")]
pub use stream::{CsvFactory, CsvStream};
pub use stream::{NdjsonFactory, NdjsonStream, RawFactory, RawStream, RecordStream, StreamFactory};
pub use transport::{
    Body, BodyReader, Headers, IncomingResponse, OutgoingRequest, Request, Response, StatusCode,
    Transport,
};

#[cfg(feature = "csv")]
pub use delim;

pub(crate) const NL: u8 = b'\n';

#[cfg(test)]
mod test {
    pub fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}
