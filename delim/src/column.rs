use std::{fmt::Display, io::Write};

use crate::{
    err::Res,
    token::{IntType, Quote, StrType},
    Error, NL,
};

type StrSetter<T> = Box<dyn Fn(&mut T, String) + Send + Sync>;
type IntSetter<T> = Box<dyn Fn(&mut T, i64) + Send + Sync>;
type Getter<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

enum Setter<T> {
    Str(StrSetter<T>),
    Int(IntSetter<T>),
}

/// A typed field of a record.
///
/// A column knows how to tokenize one field and how to store the value in a
/// record of type `T`.  A column that has a getter can also be written out.
pub struct Column<T> {
    quote: Quote,
    setter: Setter<T>,
    getter: Option<Getter<T>>,
}

impl<T> Column<T> {
    #[must_use]
    pub fn string<S>(quote: Quote, set: S) -> Self
    where
        S: Fn(&mut T, String) + Send + Sync + 'static,
    {
        Self {
            quote,
            setter: Setter::Str(Box::new(set)),
            getter: None,
        }
    }

    #[must_use]
    pub fn int<S>(quote: Quote, set: S) -> Self
    where
        S: Fn(&mut T, i64) + Send + Sync + 'static,
    {
        Self {
            quote,
            setter: Setter::Int(Box::new(set)),
            getter: None,
        }
    }

    /// Attach a getter, which is used when writing records.
    #[must_use]
    pub fn get<V, G>(mut self, get: G) -> Self
    where
        V: Display,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.getter = Some(Box::new(move |r| get(r).to_string()));
        self
    }

    #[must_use]
    pub fn quote(&self) -> Quote {
        self.quote
    }

    /// Parse the field at the start of `data` into `record`.
    /// Returns the number of bytes the field occupies, quotes included.
    pub fn parse(&self, sep: u8, data: &[u8], record: &mut T) -> Res<usize> {
        match &self.setter {
            Setter::Str(set) => {
                let tok = StrType::new(self.quote, sep).parse(data)?;
                let span = tok.span();
                set(record, tok.into_value());
                Ok(span)
            }
            Setter::Int(set) => {
                let tok = IntType::new(self.quote, sep).parse(data)?;
                set(record, *tok.value());
                Ok(tok.span())
            }
        }
    }

    fn write(&self, index: usize, record: &T, w: &mut impl Write) -> Res<()> {
        let get = self.getter.as_ref().ok_or(Error::MissingGetter { index })?;
        let v = get(record);
        match self.quote.byte() {
            Some(q) => {
                w.write_all(&[q])?;
                w.write_all(v.as_bytes())?;
                w.write_all(&[q])?;
            }
            None => w.write_all(v.as_bytes())?,
        }
        Ok(())
    }
}

/// An ordered, fixed set of columns and the separator between them.
pub struct Schema<T> {
    sep: u8,
    columns: Vec<Column<T>>,
}

impl<T> Schema<T> {
    #[must_use]
    pub fn new(sep: u8, columns: Vec<Column<T>>) -> Self {
        Self { sep, columns }
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn separator(&self) -> u8 {
        self.sep
    }

    /// Parse one record from `line` into `record`.
    ///
    /// Surrounding whitespace is ignored.  Every column but the last needs to
    /// be followed by the separator; anything after the last column is ignored.
    /// On error, `record` might be partially updated.
    pub fn parse(&self, line: &[u8], record: &mut T) -> Res<()> {
        let mut cursor = line.trim_ascii();
        let last = self.columns.len().saturating_sub(1);
        for (i, col) in self.columns.iter().enumerate() {
            let span = col.parse(self.sep, cursor, record)?;
            let rest = &cursor[span..];
            if i == last {
                break;
            }
            match rest.split_first() {
                Some((&b, tail)) if b == self.sep => cursor = tail,
                _ => {
                    return Err(Error::ColumnMismatch {
                        want: self.columns.len(),
                        have: i + 1,
                    })
                }
            }
        }
        Ok(())
    }

    /// Parse one record into a fresh value.
    pub fn parse_new(&self, line: &[u8]) -> Res<T>
    where
        T: Default,
    {
        let mut record = T::default();
        self.parse(line, &mut record)?;
        Ok(record)
    }

    /// Write `record` as a single line.
    /// Quoted columns are wrapped in their quote, with the value written as is.
    pub fn write_record(&self, record: &T, w: &mut impl Write) -> Res<()> {
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                w.write_all(&[self.sep])?;
            }
            col.write(i, record, w)?;
        }
        w.write_all(&[NL])?;
        Ok(())
    }
}
