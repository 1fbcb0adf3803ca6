use std::num::ParseIntError;

use nom::error::{ErrorKind, ParseError};
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum BencodeError<I> {
    #[error("invalid integer")]
    InvalidInteger(I),

    #[error("invalid byte string length")]
    InvalidBytesLength(I),

    #[error("duplicate dictionary key")]
    DuplicateKey(I),

    #[error("number out of range: {1}")]
    ParseIntError(I, ParseIntError),

    #[error("nesting too deep")]
    TooDeep(I),

    #[error("unexpected input ({1:?})")]
    Nom(I, ErrorKind),
}

impl<I> BencodeError<I> {
    pub fn input(&self) -> &I {
        match self {
            BencodeError::InvalidInteger(i)
            | BencodeError::InvalidBytesLength(i)
            | BencodeError::DuplicateKey(i)
            | BencodeError::TooDeep(i)
            | BencodeError::ParseIntError(i, _)
            | BencodeError::Nom(i, _) => i,
        }
    }
}

impl<I> ParseError<I> for BencodeError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        BencodeError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}
