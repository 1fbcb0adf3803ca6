use std::{collections::BTreeMap, path::Path};

use sha1::{Digest, Sha1};

use crate::bencode_parser::{Value, decode, encode};
use crate::error::{Error, Result};

pub const HASH_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub announce: String,
    pub creation_date: Option<i64>,
    pub length: u64,
    pub piece_length: u64,
    pub name: String,
    pub pieces: Vec<[u8; HASH_LEN]>,
    pub infohash: [u8; HASH_LEN],
}

type Dict = BTreeMap<Vec<u8>, Value>;

fn field<'a>(dict: &'a Dict, key: &str) -> Result<&'a Value> {
    dict.get(key.as_bytes())
        .ok_or_else(|| Error::Schema(format!("missing '{key}' field")))
}

pub fn get_string(dict: &Dict, key: &str) -> Result<String> {
    field(dict, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Schema(format!("'{key}' must be a UTF-8 string")))
}

pub fn get_u64(dict: &Dict, key: &str) -> Result<u64> {
    let value = field(dict, key)?
        .as_integer()
        .ok_or_else(|| Error::Schema(format!("'{key}' must be an integer")))?;
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| Error::Schema(format!("'{key}' must be positive, got {value}")))
}

/// SHA-1 over the canonical encoding of an `info` dictionary.
pub fn info_hash(info: &Dict) -> [u8; HASH_LEN] {
    let bytes = encode(&Value::Dictionary(info.clone()));
    Sha1::digest(&bytes).into()
}

/// Parse torrent from file path
pub fn parse_torrent_file(file_path: impl AsRef<Path>) -> Result<Torrent> {
    let data = std::fs::read(file_path)?;
    parse_torrent_bytes(&data)
}

/// Parse torrent from byte slice
pub fn parse_torrent_bytes(data: &[u8]) -> Result<Torrent> {
    let (top_level, _) = decode(data)?;

    let dict = top_level.as_dict().ok_or_else(|| {
        Error::Schema("expected top-level dictionary".to_string())
    })?;

    let announce = get_string(dict, "announce")?;
    let creation_date = dict.get(b"creation date".as_slice()).and_then(Value::as_integer);
    let info = field(dict, "info")?
        .as_dict()
        .ok_or_else(|| Error::Schema("'info' must be a dictionary".to_string()))?;

    let name = get_string(info, "name")?;
    let piece_length = get_u64(info, "piece length")?;
    let length = get_u64(info, "length")?;
    if piece_length > u64::from(u32::MAX) {
        return Err(Error::Schema(format!(
            "'piece length' {piece_length} does not fit the wire format"
        )));
    }

    let pieces_bytes = field(info, "pieces")?
        .as_bytes()
        .ok_or_else(|| Error::Schema("'pieces' must be a byte string".to_string()))?;

    if pieces_bytes.len() % HASH_LEN != 0 {
        return Err(Error::Schema(format!(
            "'pieces' length {} is not a multiple of {HASH_LEN}",
            pieces_bytes.len()
        )));
    }

    let pieces: Vec<[u8; HASH_LEN]> = pieces_bytes
        .chunks_exact(HASH_LEN)
        .map(|chunk| {
            let mut hash = [0u8; HASH_LEN];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    let expected_pieces = length.div_ceil(piece_length);
    if pieces.len() as u64 != expected_pieces {
        return Err(Error::Schema(format!(
            "{} piece hashes for {length} bytes in pieces of {piece_length}, expected {expected_pieces}",
            pieces.len()
        )));
    }

    Ok(Torrent {
        announce,
        creation_date,
        length,
        piece_length,
        name,
        pieces,
        infohash: info_hash(info),
    })
}

impl Torrent {
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Length of the piece at `index`; every piece is `piece_length` long
    /// except the last, which holds the remainder.
    pub fn piece_len(&self, index: usize) -> Option<u64> {
        if index >= self.piece_count() {
            return None;
        }
        let begin = index as u64 * self.piece_length;
        Some(self.piece_length.min(self.length - begin))
    }

    pub fn piece_hash(&self, index: usize) -> Option<&[u8; HASH_LEN]> {
        self.pieces.get(index)
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.infohash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn info_dict(length: i64, piece_length: i64, piece_count: usize) -> Value {
        Value::dictionary([
            ("length", Value::Integer(length)),
            ("name", Value::from("sample.txt")),
            ("piece length", Value::Integer(piece_length)),
            ("pieces", Value::Bytes(vec![0xAB; piece_count * HASH_LEN])),
        ])
    }

    fn torrent_bytes(info: Value) -> Vec<u8> {
        encode(&Value::dictionary([
            ("announce", Value::from("http://tracker.example.com/announce")),
            ("info", info),
        ]))
    }

    #[test]
    fn test_parse_torrent() {
        let torrent = parse_torrent_bytes(&torrent_bytes(info_dict(820892, 262144, 4))).unwrap();

        assert_eq!(torrent.announce, "http://tracker.example.com/announce");
        assert_eq!(torrent.name, "sample.txt");
        assert_eq!(torrent.length, 820892);
        assert_eq!(torrent.piece_length, 262144);
        assert_eq!(torrent.piece_count(), 4);
        assert_eq!(torrent.creation_date, None);
        assert_eq!(torrent.piece_hash(3), Some(&[0xAB; HASH_LEN]));
        assert_eq!(torrent.piece_hash(4), None);
    }

    #[test]
    fn test_piece_lengths() {
        let torrent = parse_torrent_bytes(&torrent_bytes(info_dict(820892, 262144, 4))).unwrap();

        let lengths: Vec<u64> = (0..torrent.piece_count())
            .map(|i| torrent.piece_len(i).unwrap())
            .collect();
        assert_eq!(lengths, vec![262144, 262144, 262144, 34460]);
        assert_eq!(lengths.iter().sum::<u64>(), torrent.length);
        assert_eq!(torrent.piece_len(4), None);
    }

    #[test]
    fn test_exact_multiple_last_piece_is_full() {
        let torrent = parse_torrent_bytes(&torrent_bytes(info_dict(32768, 16384, 2))).unwrap();
        assert_eq!(torrent.piece_len(1), Some(16384));
    }

    #[test]
    fn test_info_hash_matches_sha1_of_info() {
        let info = info_dict(820892, 262144, 4);
        let torrent = parse_torrent_bytes(&torrent_bytes(info.clone())).unwrap();

        let expected: [u8; HASH_LEN] = Sha1::digest(encode(&info)).into();
        assert_eq!(torrent.infohash, expected);
        assert_eq!(torrent.info_hash_hex(), hex::encode(expected));
    }

    #[test]
    fn test_info_hash_independent_of_key_order() {
        let pieces = [0x11u8; HASH_LEN];
        let mut sorted = b"d8:announce3:url4:infod6:lengthi10e4:name1:a12:piece lengthi16e6:pieces20:".to_vec();
        sorted.extend_from_slice(&pieces);
        sorted.extend_from_slice(b"ee");

        let mut shuffled = b"d4:infod6:pieces20:".to_vec();
        shuffled.extend_from_slice(&pieces);
        shuffled.extend_from_slice(b"4:name1:a12:piece lengthi16e6:lengthi10ee8:announce3:urle");

        let a = parse_torrent_bytes(&sorted).unwrap();
        let b = parse_torrent_bytes(&shuffled).unwrap();
        assert_eq!(a.infohash, b.infohash);
        assert_eq!(a, b);
    }

    #[test]
    fn test_reads_creation_date() {
        let bytes = encode(&Value::dictionary([
            ("announce", Value::from("http://t")),
            ("creation date", Value::Integer(1234567890)),
            ("info", info_dict(10, 16, 1)),
        ]));
        let torrent = parse_torrent_bytes(&bytes).unwrap();
        assert_eq!(torrent.creation_date, Some(1234567890));
    }

    #[test]
    fn test_missing_fields() {
        let no_info = encode(&Value::dictionary([("announce", Value::from("http://t"))]));
        assert_matches!(parse_torrent_bytes(&no_info), Err(Error::Schema(_)));

        let no_announce = encode(&Value::dictionary([("info", info_dict(10, 16, 1))]));
        assert_matches!(parse_torrent_bytes(&no_announce), Err(Error::Schema(_)));

        let mut info = info_dict(10, 16, 1);
        if let Value::Dictionary(d) = &mut info {
            d.remove(b"name".as_slice());
        }
        assert_matches!(parse_torrent_bytes(&torrent_bytes(info)), Err(Error::Schema(_)));
    }

    #[test]
    fn test_wrong_variants() {
        assert_matches!(
            parse_torrent_bytes(b"l4:spame"),
            Err(Error::Schema(_))
        );

        let mut info = info_dict(10, 16, 1);
        if let Value::Dictionary(d) = &mut info {
            d.insert(b"length".to_vec(), Value::from("ten"));
        }
        assert_matches!(parse_torrent_bytes(&torrent_bytes(info)), Err(Error::Schema(_)));

        let bytes = encode(&Value::dictionary([
            ("announce", Value::from("http://t")),
            ("info", Value::List(vec![])),
        ]));
        assert_matches!(parse_torrent_bytes(&bytes), Err(Error::Schema(_)));
    }

    #[test]
    fn test_pieces_not_multiple_of_hash_len() {
        let mut info = info_dict(10, 16, 1);
        if let Value::Dictionary(d) = &mut info {
            d.insert(b"pieces".to_vec(), Value::Bytes(vec![0; 21]));
        }
        assert_matches!(parse_torrent_bytes(&torrent_bytes(info)), Err(Error::Schema(_)));
    }

    #[test]
    fn test_piece_count_mismatch() {
        assert_matches!(
            parse_torrent_bytes(&torrent_bytes(info_dict(820892, 262144, 3))),
            Err(Error::Schema(_))
        );
    }

    #[test]
    fn test_non_positive_lengths() {
        assert_matches!(
            parse_torrent_bytes(&torrent_bytes(info_dict(0, 16, 0))),
            Err(Error::Schema(_))
        );
        assert_matches!(
            parse_torrent_bytes(&torrent_bytes(info_dict(10, -16, 1))),
            Err(Error::Schema(_))
        );
    }

    #[test]
    fn test_malformed_file() {
        assert_matches!(
            parse_torrent_bytes(b"d8:announce"),
            Err(Error::MalformedEncoding { .. })
        );
    }
}
