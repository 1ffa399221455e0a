//
// License CC0: https://creativecommons.org/publicdomain/zero/1.0/
//

#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Too lazy to document.

//! Quote-aware tokenizing of delimited records.
//!
//! A [`Schema`] is an ordered set of [`Column`]s that parses one line into a
//! record, one field at a time.

mod column;
mod err;
mod token;

pub use column::{Column, Schema};
pub use err::{Error, Res};
pub use token::{IntType, Quote, StrType, Token};

pub const COMMA: u8 = b',';
pub const SEMICOLON: u8 = b';';
pub const TAB: u8 = b'\t';
pub(crate) const NL: u8 = b'\n';
