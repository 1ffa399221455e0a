use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[cfg(feature = "csv")]
    #[error("delimited record error: {0}")]
    Delim(#[from] delim::Error),
    #[error("unknown content type: {0:?}")]
    UnknownContentType(String),
    #[error("unexpected type: wanted {want}, got {have}")]
    TypeMismatch {
        want: &'static str,
        have: &'static str,
    },
    #[error("unexpected status code: want one of {want:?}, have {have}")]
    UnexpectedStatusCode { want: Vec<u16>, have: u16 },
    #[error("assertion was unmet: {0}")]
    AssertionFailed(String),
    #[error("line exceeds the limit of {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("the body producer failed: {0}")]
    Producer(String),
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),
    #[error("an IO error occurred: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Res<T> = Result<T, Error>;
