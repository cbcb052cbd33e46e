//! Self-delimiting record codec.
//!
//! A `Record` is a tagged value tree — the same primitive set the
//! MessagePack wire format covers (nil, bool, signed/unsigned integer, byte
//! string, unicode string, array, map) — so `Record` is a thin alias over
//! [`rmpv::Value`] rather than a hand-rolled sum type. Byte-string map keys
//! stay `Value::Binary`; nothing here ever coerces them to `Value::String`.
//!
//! The [`Decoder`] is incremental and position-preserving: `feed` appends
//! bytes, `next` either produces one [`Decoded::Value`] and drops the
//! consumed prefix, or leaves the pending buffer untouched and reports
//! [`Decoded::NeedMore`] / [`Decoded::Malformed`]. The codec itself never
//! resyncs past a malformed byte — that is [`crate::unpacker`]'s job.

use std::io::Cursor;

/// A self-delimiting record value. See the module docs for the value model.
pub type Record = rmpv::Value;

/// Outcome of one [`Decoder::next`] call.
#[derive(Debug)]
pub enum Decoded {
    /// One complete, well-formed record was decoded and consumed.
    Value(Record),
    /// Not enough buffered bytes to complete a record; nothing consumed.
    NeedMore,
    /// The bytes at the cursor do not form a valid record; nothing consumed.
    Malformed,
}

/// Incremental decoder over an accumulating byte buffer.
#[derive(Default)]
pub struct Decoder {
    pending: Vec<u8>,
}

impl Decoder {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Append bytes to the pending input. Never blocks, never fails.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Attempt to decode one record from the front of the pending buffer.
    ///
    /// On [`Decoded::Value`], the consumed prefix is dropped from the
    /// buffer. On [`Decoded::NeedMore`] or [`Decoded::Malformed`], the
    /// buffer is left exactly as it was — the caller decides whether to
    /// wait for more bytes or skip one and retry (see [`crate::unpacker`]).
    pub fn next(&mut self) -> Decoded {
        if self.pending.is_empty() {
            return Decoded::NeedMore;
        }
        let mut cursor = Cursor::new(self.pending.as_slice());
        match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => {
                let consumed = cursor.position() as usize;
                self.pending.drain(..consumed);
                Decoded::Value(value)
            }
            Err(err) => {
                if needs_more_data(&err) {
                    Decoded::NeedMore
                } else {
                    Decoded::Malformed
                }
            }
        }
    }

    /// Number of bytes currently buffered and not yet consumed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop up to `n` bytes from the front of the pending buffer. Used by
    /// the robust unpacker's byte-at-a-time resync scan.
    pub fn drop_front(&mut self, n: usize) {
        let n = n.min(self.pending.len());
        self.pending.drain(..n);
    }
}

fn needs_more_data(err: &rmpv::decode::Error) -> bool {
    use rmpv::decode::Error::*;
    match err {
        InvalidMarkerRead(e) | InvalidDataRead(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// Encode `value` as a self-delimiting byte string.
///
/// `encode(v1)` followed by `encode(v2)` decodes, with no separators, back
/// to the sequence `v1, v2` — this is the self-delimiting property the
/// whole core depends on.
pub fn encode(value: &Record) -> Vec<u8> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value)
        .expect("encoding a Record into an in-memory buffer cannot fail");
    buf
}

// ── Constructors ─────────────────────────────────────────────────────────────
//
// `Record` is a foreign type alias (`rmpv::Value`), so these are free
// functions rather than inherent methods — the tagged-sum-type constructor
// surface the value model calls for, expressed the only way the orphan
// rules allow.

pub fn nil() -> Record {
    Record::Nil
}

pub fn boolean(v: bool) -> Record {
    Record::Boolean(v)
}

pub fn int(v: i64) -> Record {
    Record::from(v)
}

pub fn uint(v: u64) -> Record {
    Record::from(v)
}

pub fn bytes(b: impl Into<Vec<u8>>) -> Record {
    Record::Binary(b.into())
}

pub fn text(s: impl Into<String>) -> Record {
    Record::String(s.into().into())
}

pub fn array(items: Vec<Record>) -> Record {
    Record::Array(items)
}

/// Build a map record. Keys are always encoded as byte strings
/// (`Value::Binary`), never coerced to text.
pub fn map(pairs: Vec<(Vec<u8>, Record)>) -> Record {
    Record::Map(pairs.into_iter().map(|(k, v)| (Record::Binary(k), v)).collect())
}

// ── Matchers ─────────────────────────────────────────────────────────────────

pub fn as_bytes(value: &Record) -> Option<&[u8]> {
    match value {
        Record::Binary(b) => Some(b),
        _ => None,
    }
}

pub fn as_text(value: &Record) -> Option<&str> {
    match value {
        Record::String(s) => s.as_str(),
        _ => None,
    }
}

pub fn as_i64(value: &Record) -> Option<i64> {
    match value {
        Record::Integer(i) => i.as_i64(),
        _ => None,
    }
}

pub fn as_u64(value: &Record) -> Option<u64> {
    match value {
        Record::Integer(i) => i.as_u64(),
        _ => None,
    }
}

pub fn as_array(value: &Record) -> Option<&[Record]> {
    match value {
        Record::Array(items) => Some(items),
        _ => None,
    }
}

pub fn as_map(value: &Record) -> Option<&[(Record, Record)]> {
    match value {
        Record::Map(pairs) => Some(pairs),
        _ => None,
    }
}

/// Look up a byte-string key in a map record.
pub fn map_get<'a>(value: &'a Record, key: &[u8]) -> Option<&'a Record> {
    as_map(value)?
        .iter()
        .find(|(k, _)| k == &Record::Binary(key.to_vec()))
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_map_with_binary_keys() {
        let rec = map(vec![(b"path".to_vec(), bytes(*b"foo"))]);
        let encoded = encode(&rec);
        let mut dec = Decoder::new();
        dec.feed(&encoded);
        match dec.next() {
            Decoded::Value(v) => {
                let path = map_get(&v, b"path").expect("path key present");
                assert_eq!(as_bytes(path), Some(&b"foo"[..]));
            }
            other => panic!("expected Value, got {other:?}"),
        }
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn concatenated_records_decode_in_sequence() {
        let a = int(1);
        let b = int(2);
        let mut blob = encode(&a);
        blob.extend(encode(&b));

        let mut dec = Decoder::new();
        dec.feed(&blob);
        let v1 = match dec.next() {
            Decoded::Value(v) => v,
            other => panic!("expected Value, got {other:?}"),
        };
        let v2 = match dec.next() {
            Decoded::Value(v) => v,
            other => panic!("expected Value, got {other:?}"),
        };
        assert_eq!(as_i64(&v1), Some(1));
        assert_eq!(as_i64(&v2), Some(2));
    }

    #[test]
    fn short_buffer_reports_need_more_without_consuming() {
        let full = encode(&map(vec![(b"k".to_vec(), text("value"))]));
        let mut dec = Decoder::new();
        dec.feed(&full[..full.len() - 1]);
        assert!(matches!(dec.next(), Decoded::NeedMore));
        assert_eq!(dec.pending_len(), full.len() - 1);
    }

    #[test]
    fn garbage_byte_decodes_as_small_positive_integer() {
        // 'g' = 0x67, a valid MessagePack positive fixint (103).
        let mut dec = Decoder::new();
        dec.feed(b"g");
        match dec.next() {
            Decoded::Value(v) => assert_eq!(as_i64(&v), Some(103)),
            other => panic!("expected Value, got {other:?}"),
        }
    }
}
