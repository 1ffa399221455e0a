use crate::{err::Res, Error};

const BACKSLASH: u8 = b'\\';

/// How a field is enclosed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quote {
    #[default]
    None,
    Double,
    Single,
}

impl Quote {
    #[must_use]
    pub fn byte(self) -> Option<u8> {
        match self {
            Self::None => None,
            Self::Double => Some(b'"'),
            Self::Single => Some(b'\''),
        }
    }
}

/// The result of tokenizing a single field.
///
/// `read` is the length of the field value.  `span` is the number of bytes
/// taken from the input, which includes the enclosing quotes, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<V> {
    value: V,
    read: usize,
    span: usize,
}

impl<V> Token<V> {
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    #[must_use]
    pub fn read(&self) -> usize {
        self.read
    }

    #[must_use]
    pub fn span(&self) -> usize {
        self.span
    }

    fn map<U>(self, f: impl FnOnce(V) -> U) -> Token<U> {
        Token {
            value: f(self.value),
            read: self.read,
            span: self.span,
        }
    }
}

fn index_of(v: u8, data: &[u8]) -> Option<usize> {
    data.iter().position(|&x| x == v)
}

/// Find the closing quote of a field that starts with `q`.
/// The closing quote is one that is not preceded by a backslash
/// and is followed by either the separator or the end of the data.
fn closing_quote(q: u8, sep: u8, data: &[u8]) -> Option<usize> {
    (1..data.len()).find(|&i| {
        data[i] == q
            && data[i - 1] != BACKSLASH
            && data.get(i + 1).is_none_or(|&n| n == sep)
    })
}

/// A string field.
#[derive(Debug, Clone, Copy)]
pub struct StrType {
    quote: Quote,
    sep: u8,
}

impl StrType {
    #[must_use]
    pub fn new(quote: Quote, sep: u8) -> Self {
        Self { quote, sep }
    }

    /// Tokenize the field at the start of `data`.
    /// Escape markers inside a quoted field are kept as they are.
    pub fn parse(&self, data: &[u8]) -> Res<Token<String>> {
        let Some(q) = self.quote.byte() else {
            let end = index_of(self.sep, data).unwrap_or(data.len());
            return Ok(Token {
                value: String::from_utf8(data[..end].to_vec())?,
                read: end,
                span: end,
            });
        };

        if data.first() != Some(&q) {
            return Err(Error::QuoteExpected {
                quote: char::from(q),
            });
        }
        let end = closing_quote(q, self.sep, data).ok_or(Error::UnterminatedQuote {
            quote: char::from(q),
        })?;
        let payload = &data[1..end];
        Ok(Token {
            value: String::from_utf8(payload.to_vec())?,
            read: payload.len(),
            span: end + 1,
        })
    }
}

/// A base-10 signed integer field.
#[derive(Debug, Clone, Copy)]
pub struct IntType {
    inner: StrType,
}

impl IntType {
    #[must_use]
    pub fn new(quote: Quote, sep: u8) -> Self {
        Self {
            inner: StrType::new(quote, sep),
        }
    }

    pub fn parse(&self, data: &[u8]) -> Res<Token<i64>> {
        let tok = self.inner.parse(data)?;
        let v = tok
            .value()
            .parse::<i64>()
            .map_err(|e| Error::ValueConversion {
                value: tok.value().clone(),
                reason: e.to_string(),
            })?;
        Ok(tok.map(|_| v))
    }
}
