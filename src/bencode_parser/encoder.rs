use crate::bencode_parser::parser::Value;

/// Encodes `value` into its canonical bencode form.
///
/// Dictionary keys are written in ascending raw-byte order, which makes the
/// output a pure function of the value: two dictionaries holding the same
/// entries always encode to the same bytes.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf);
    buf
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

/// Appends the canonical encoding of `value` to `buf`.
pub fn encode_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Bytes(b) => encode_bytes(b, buf),
        Value::Integer(i) => {
            buf.push(b'i');
            buf.extend_from_slice(i.to_string().as_bytes());
            buf.push(b'e');
        }
        Value::List(items) => {
            buf.push(b'l');
            for item in items {
                encode_into(item, buf);
            }
            buf.push(b'e');
        }
        Value::Dictionary(entries) => {
            buf.push(b'd');
            // BTreeMap<Vec<u8>, _> iterates in lexicographic byte order
            for (key, item) in entries {
                encode_bytes(key, buf);
                encode_into(item, buf);
            }
            buf.push(b'e');
        }
    }
}

impl Value {
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }
}
