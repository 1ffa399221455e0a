use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("quote was expected: {quote}")]
    QuoteExpected { quote: char },
    #[error("quoted field has no closing {quote}")]
    UnterminatedQuote { quote: char },
    #[error("column mismatch: expected {want} columns, found {have}")]
    ColumnMismatch { want: usize, have: usize },
    #[error("unable to convert {value:?}: {reason}")]
    ValueConversion { value: String, reason: String },
    #[error("column {index} has no getter")]
    MissingGetter { index: usize },
    #[error("field is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("an IO error occurred: {0}")]
    Io(#[from] std::io::Error),
}

pub type Res<T> = Result<T, Error>;
