use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take,
    character::complete::{char, digit1},
    combinator::{map, opt, recognize},
    multi::many_till,
    sequence::{delimited, pair, preceded},
};
use std::collections::BTreeMap;

use crate::bencode_parser::errors::BencodeError;
use crate::error::{Error, Result};

/// Deepest list/dictionary nesting accepted before decoding gives up.
pub const MAX_DEPTH: usize = 128;

type BenError<'a> = BencodeError<&'a [u8]>;
type BenResult<'a, T = Value> = IResult<&'a [u8], T, BenError<'a>>;

/// A decoded bencode value.
///
/// Dictionaries are keyed by raw bytes in a `BTreeMap`, so iteration order is
/// always ascending byte order regardless of the order keys were decoded or
/// inserted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Integer(i64),
    List(Vec<Value>),
    Dictionary(BTreeMap<Vec<u8>, Value>),
}

fn token<'a>(c: char) -> impl Parser<&'a [u8], Output = char, Error = BenError<'a>> {
    char(c)
}

fn digits(inp: &[u8]) -> BenResult<'_, &[u8]> {
    digit1(inp)
}

fn take_bytes(inp: &[u8], count: usize) -> BenResult<'_, &[u8]> {
    take(count).parse(inp)
}

impl Value {
    fn parse_integer(start_inp: &[u8]) -> BenResult<'_> {
        let (inp, value) = delimited(
            token('i'),
            recognize(pair(opt(token('-')), digits)),
            token('e'),
        )
        .parse(start_inp)?;

        let invalid = || nom::Err::Failure(BencodeError::InvalidInteger(start_inp));
        let value_str = std::str::from_utf8(value).map_err(|_| invalid())?;

        if value_str.starts_with("-0") || (value_str.starts_with('0') && value_str.len() > 1) {
            return Err(invalid());
        }

        let value_integer: i64 = value_str
            .parse()
            .map_err(|e| nom::Err::Failure(BencodeError::ParseIntError(start_inp, e)))?;
        Ok((inp, Value::Integer(value_integer)))
    }

    fn parse_bytes(start_inp: &[u8]) -> BenResult<'_, &[u8]> {
        let (inp, length) = digits(start_inp)?;
        let (inp, _) = token(':').parse(inp)?;

        let invalid = || nom::Err::Failure(BencodeError::InvalidBytesLength(start_inp));
        if length.len() > 1 && length[0] == b'0' {
            return Err(invalid());
        }
        let length: usize = std::str::from_utf8(length)
            .map_err(|_| invalid())?
            .parse()
            .map_err(|e| nom::Err::Failure(BencodeError::ParseIntError(start_inp, e)))?;

        take_bytes(inp, length)
    }

    fn parse_list<'a>(start_inp: &'a [u8], depth: usize) -> BenResult<'a> {
        let item = move |inp: &'a [u8]| Self::parse_value(inp, depth + 1);
        let (inp, (items, _)) =
            preceded(token('l'), many_till(item, token('e'))).parse(start_inp)?;

        Ok((inp, Value::List(items)))
    }

    fn parse_dict<'a>(start_inp: &'a [u8], depth: usize) -> BenResult<'a> {
        let item = move |inp: &'a [u8]| Self::parse_value(inp, depth + 1);
        let (inp, (entries, _)) = preceded(
            token('d'),
            many_till(pair(Self::parse_bytes, item), token('e')),
        )
        .parse(start_inp)?;

        let mut map = BTreeMap::new();
        for (key, value) in entries {
            if map.insert(key.to_vec(), value).is_some() {
                return Err(nom::Err::Failure(BencodeError::DuplicateKey(start_inp)));
            }
        }

        Ok((inp, Value::Dictionary(map)))
    }

    fn parse_value<'a>(inp: &'a [u8], depth: usize) -> BenResult<'a> {
        if depth > MAX_DEPTH {
            return Err(nom::Err::Failure(BencodeError::TooDeep(inp)));
        }
        alt((
            map(Self::parse_bytes, |bytes: &[u8]| Value::Bytes(bytes.to_vec())),
            Self::parse_integer,
            move |inp: &'a [u8]| Self::parse_list(inp, depth),
            move |inp: &'a [u8]| Self::parse_dict(inp, depth),
        ))
        .parse(inp)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up `key` if this value is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Builds a dictionary from `(key, value)` pairs given in any order.
    pub fn dictionary<K, I>(entries: I) -> Self
    where
        K: Into<Vec<u8>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Dictionary(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Renders the value the way the `decode` command prints it. Byte strings
    /// that are not valid UTF-8 are converted lossily.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::List(l) => serde_json::Value::Array(l.iter().map(Value::to_json).collect()),
            Value::Dictionary(d) => serde_json::Value::Object(
                d.iter()
                    .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Bytes(value.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

fn malformed(source: &[u8], err: nom::Err<BenError<'_>>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::MalformedEncoding {
            offset: source.len(),
            reason: "unexpected end of input".to_string(),
        },
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let rest = e.input();
            let reason = if rest.is_empty() {
                "unexpected end of input".to_string()
            } else {
                e.to_string()
            };
            Error::MalformedEncoding {
                offset: source.len() - rest.len(),
                reason,
            }
        }
    }
}

/// Decodes the first value in `source`, returning it together with the
/// number of bytes it occupied.
///
/// # Errors
/// Returns `Error::MalformedEncoding` if `source` does not start with a
/// well-formed value.
pub fn decode(source: &[u8]) -> Result<(Value, usize)> {
    match Value::parse_value(source, 0) {
        Ok((rest, value)) => Ok((value, source.len() - rest.len())),
        Err(e) => Err(malformed(source, e)),
    }
}

/// Parses the provided bencode `source`, which may hold several values back
/// to back.
///
/// # Errors
/// Returns `Err` if there was an error parsing `source`, including trailing
/// bytes that do not form a value.
pub fn parse(source: &[u8]) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut offset = 0;

    while offset < source.len() {
        match decode(&source[offset..]) {
            Ok((value, used)) => {
                items.push(value);
                offset += used;
            }
            Err(Error::MalformedEncoding { offset: at, reason }) => {
                return Err(Error::MalformedEncoding {
                    offset: offset + at,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(items)
}
