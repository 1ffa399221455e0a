use std::{
    any::{type_name, Any},
    collections::HashMap,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{err::Res, Error, NL};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_JSON_EACH_ROW: &str = "application/jsoneachrow";
pub const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

const JSON_SUFFIX: &str = "+json";

/// An encoding for the records carried in a body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    /// A single JSON document.
    Json,
    /// One JSON document per line.
    JsonEachRow,
    /// Bytes that are already encoded.  Only `Vec<u8>` values are accepted.
    RawBytes,
}

impl Codec {
    pub fn encode<T: Serialize + Any>(self, v: &T) -> Res<Vec<u8>> {
        match self {
            Self::Json => Ok(serde_json::to_vec(v)?),
            Self::JsonEachRow => {
                let mut buf = serde_json::to_vec(v)?;
                buf.push(NL);
                Ok(buf)
            }
            Self::RawBytes => (v as &dyn Any)
                .downcast_ref::<Vec<u8>>()
                .cloned()
                .ok_or(Error::TypeMismatch {
                    want: type_name::<Vec<u8>>(),
                    have: type_name::<T>(),
                }),
        }
    }

    /// Decode every record in a whole body.
    ///
    /// A JSON body holds one record.  A JSON-each-row body holds one record
    /// per line, with blank lines skipped.  A raw body is one `Vec<u8>`.
    pub fn decode<T: DeserializeOwned + Any>(self, data: &[u8]) -> Res<Vec<T>> {
        match self {
            Self::Json => Ok(vec![serde_json::from_slice(data)?]),
            Self::JsonEachRow => data
                .split(|&b| b == NL)
                .filter(|line| !line.trim_ascii().is_empty())
                .map(|line| serde_json::from_slice(line).map_err(Error::from))
                .collect(),
            Self::RawBytes => Ok(vec![raw_record(data.to_vec())?]),
        }
    }
}

/// Hand over a chunk of bytes as a record of type `T`, which has to be
/// `Vec<u8>`.
pub(crate) fn raw_record<T: Any>(chunk: Vec<u8>) -> Res<T> {
    let boxed: Box<dyn Any> = Box::new(chunk);
    boxed
        .downcast::<T>()
        .map(|v| *v)
        .map_err(|_| Error::TypeMismatch {
            want: type_name::<Vec<u8>>(),
            have: type_name::<T>(),
        })
}

/// Reduce a content type to its lowercase media type, without parameters.
fn normalize(content_type: &str) -> String {
    let media = content_type
        .split_once(';')
        .map_or(content_type, |(m, _)| m);
    media.trim().to_ascii_lowercase()
}

/// A table from content type to [`Codec`].
///
/// Lookups ignore case and parameters, so `Application/JSON; charset=utf-8`
/// finds the entry for `application/json`.  Any `+json` media type that is
/// not in the table is treated as JSON.
#[derive(Clone, Debug)]
pub struct CodecRegistry {
    table: HashMap<String, Codec>,
}

impl CodecRegistry {
    /// A registry with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn register(&mut self, content_type: &str, codec: Codec) {
        self.table.insert(normalize(content_type), codec);
    }

    pub fn lookup(&self, content_type: &str) -> Res<Codec> {
        let key = normalize(content_type);
        if let Some(c) = self.table.get(&key) {
            return Ok(*c);
        }
        if key.ends_with(JSON_SUFFIX) {
            return Ok(Codec::Json);
        }
        Err(Error::UnknownContentType(content_type.to_owned()))
    }

    /// Encode a single value for a body of the given content type.
    pub fn encode<T: Serialize + Any>(&self, content_type: &str, v: &T) -> Res<Vec<u8>> {
        self.lookup(content_type)?.encode(v)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register(CONTENT_TYPE_JSON, Codec::Json);
        r.register(CONTENT_TYPE_JSON_EACH_ROW, Codec::JsonEachRow);
        r.register(CONTENT_TYPE_NDJSON, Codec::JsonEachRow);
        r.register(CONTENT_TYPE_OCTET_STREAM, Codec::RawBytes);
        r
    }
}
