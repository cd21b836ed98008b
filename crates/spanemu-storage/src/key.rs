//! Keys, key sets, and the order-preserving key encoding.
//!
//! Every ordered store in the engine is keyed by bytes. Key tuples are
//! encoded so that byte-wise comparison of two encodings matches
//! lexicographic comparison of the typed tuples:
//!
//! | Value | Encoding |
//! |---|---|
//! | NULL | `0x00` (sorts first) |
//! | BOOL | `0x10`, `0`/`1` |
//! | INT64 | `0x20`, sign-flipped big-endian |
//! | FLOAT64 | `0x30`, total-order bits big-endian |
//! | STRING | `0x40`, bytes with `0x00` escaped as `0x00 0xFF`, then `0x00 0x01` |
//! | BYTES | `0x50`, same escaping as STRING |
//!
//! Each component is self-delimiting, so a byte prefix made of whole
//! components selects exactly the keys whose leading components are equal.

use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::value::{ColumnType, Value};
use crate::error::{StorageError, StorageResult};

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x10;
const TAG_INT64: u8 = 0x20;
const TAG_FLOAT64: u8 = 0x30;
const TAG_STRING: u8 = 0x40;
const TAG_BYTES: u8 = 0x50;

/// A (possibly partial) key tuple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Key {
    parts: Vec<Value>,
}

impl Key {
    pub fn new(parts: Vec<Value>) -> Self {
        Self { parts }
    }

    /// Build a key from homogeneous parts, e.g. `Key::of(["fifty"])`.
    pub fn of<I, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parts(&self) -> &[Value] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// A range between two (possibly partial) keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Key,
    pub start_closed: bool,
    pub end: Key,
    pub end_closed: bool,
}

impl KeyRange {
    pub fn closed_closed(start: Key, end: Key) -> Self {
        Self { start, start_closed: true, end, end_closed: true }
    }

    pub fn closed_open(start: Key, end: Key) -> Self {
        Self { start, start_closed: true, end, end_closed: false }
    }

    pub fn open_closed(start: Key, end: Key) -> Self {
        Self { start, start_closed: false, end, end_closed: true }
    }

    pub fn open_open(start: Key, end: Key) -> Self {
        Self { start, start_closed: false, end, end_closed: false }
    }
}

/// Which keys of an ordered store a read or delete touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySet {
    /// Every key, in order.
    All,
    /// Keys whose leading components equal the given key.
    Single(Key),
    /// Keys whose encoding starts with the key's encoding; a trailing
    /// STRING/BYTES component matches as a raw byte prefix.
    Prefix(Key),
    /// Keys between two bounds.
    Range(KeyRange),
}

impl KeySet {
    pub fn all() -> Self {
        KeySet::All
    }

    pub fn single_key(key: Key) -> Self {
        KeySet::Single(key)
    }

    pub fn prefix_range(key: Key) -> Self {
        KeySet::Prefix(key)
    }

    pub fn range(range: KeyRange) -> Self {
        KeySet::Range(range)
    }
}

/// Byte bounds over an ordered store: inclusive start, exclusive end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBounds {
    pub start: Option<Vec<u8>>,
    pub end: Option<Vec<u8>>,
}

impl ScanBounds {
    pub fn unbounded() -> Self {
        Self { start: None, end: None }
    }

    /// Every key that begins with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = prefix_successor(&prefix);
        Self { start: Some(prefix), end }
    }

    /// True if no key can fall inside the bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => start >= end,
            _ => false,
        }
    }

    pub fn as_range(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        let start = match &self.start {
            Some(s) => Bound::Included(s.as_slice()),
            None => Bound::Unbounded,
        };
        let end = match &self.end {
            Some(e) => Bound::Excluded(e.as_slice()),
            None => Bound::Unbounded,
        };
        (start, end)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.start.as_deref().is_none_or(|s| key >= s)
            && self.end.as_deref().is_none_or(|e| key < e)
    }
}

impl KeySet {
    /// Resolve this key set into byte bounds over a store whose key columns
    /// have the given types. Key parts are coerced to the column types.
    pub fn bounds(&self, key_columns: &[(String, ColumnType)]) -> StorageResult<ScanBounds> {
        match self {
            KeySet::All => Ok(ScanBounds::unbounded()),
            KeySet::Single(key) => {
                let parts = coerce_key(key, key_columns)?;
                Ok(ScanBounds::prefix(encode_key(&parts)))
            }
            KeySet::Prefix(key) => {
                let parts = coerce_key(key, key_columns)?;
                Ok(ScanBounds::prefix(encode_prefix(&parts)))
            }
            KeySet::Range(range) => {
                let start = encode_key(&coerce_key(&range.start, key_columns)?);
                let end = encode_key(&coerce_key(&range.end, key_columns)?);
                let start = if range.start_closed {
                    Some(start)
                } else {
                    match prefix_successor(&start) {
                        Some(next) => Some(next),
                        // Nothing sorts after an all-0xFF prefix.
                        None => return Ok(ScanBounds { start: Some(vec![0xFF]), end: Some(vec![0xFF]) }),
                    }
                };
                let end = if range.end_closed { prefix_successor(&end) } else { Some(end) };
                Ok(ScanBounds { start, end })
            }
        }
    }
}

fn coerce_key(key: &Key, key_columns: &[(String, ColumnType)]) -> StorageResult<Vec<Value>> {
    if key.len() > key_columns.len() {
        return Err(StorageError::InvalidArgument(format!(
            "key has {} parts but only {} key columns exist",
            key.len(),
            key_columns.len()
        )));
    }
    key.parts()
        .iter()
        .zip(key_columns)
        .map(|(part, (name, ty))| part.clone().coerce(name, *ty))
        .collect()
}

/// Encode a full or partial key tuple.
pub fn encode_key(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 9);
    for value in values {
        encode_value(value, &mut out, true);
    }
    out
}

/// Encode a key tuple whose last STRING/BYTES part is left unterminated,
/// so it matches any value that starts with it.
pub fn encode_prefix(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    let Some((last, leading)) = values.split_last() else {
        return out;
    };
    for value in leading {
        encode_value(value, &mut out, true);
    }
    encode_value(last, &mut out, false);
    out
}

/// Smallest byte string greater than every string starting with `prefix`.
///
/// `None` when no such string exists (empty or all-0xFF prefix).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut next = prefix.to_vec();
    for i in (0..next.len()).rev() {
        if next[i] != 0xFF {
            next[i] += 1;
            next.truncate(i + 1);
            return Some(next);
        }
    }
    None
}

fn encode_value(value: &Value, out: &mut Vec<u8>, terminate: bool) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Int64(i) => {
            out.push(TAG_INT64);
            let shifted = (*i as u64) ^ 0x8000_0000_0000_0000;
            out.extend_from_slice(&shifted.to_be_bytes());
        }
        Value::Float64(f) => {
            out.push(TAG_FLOAT64);
            let bits = f.to_bits();
            let mapped = if (bits >> 63) == 1 {
                !bits
            } else {
                bits ^ 0x8000_0000_0000_0000
            };
            out.extend_from_slice(&mapped.to_be_bytes());
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            append_escaped(s.as_bytes(), out, terminate);
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            append_escaped(b, out, terminate);
        }
    }
}

fn append_escaped(bytes: &[u8], out: &mut Vec<u8>, terminate: bool) {
    for byte in bytes {
        if *byte == 0 {
            out.extend_from_slice(&[0x00, 0xFF]);
        } else {
            out.push(*byte);
        }
    }
    if terminate {
        out.extend_from_slice(&[0x00, 0x01]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(types: &[ColumnType]) -> Vec<(String, ColumnType)> {
        types
            .iter()
            .enumerate()
            .map(|(i, ty)| (format!("c{i}"), *ty))
            .collect()
    }

    #[test]
    fn integer_order_is_preserved() {
        let a = encode_key(&[Value::Int64(-5)]);
        let b = encode_key(&[Value::Int64(0)]);
        let c = encode_key(&[Value::Int64(42)]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn float_order_is_preserved() {
        let a = encode_key(&[Value::Float64(-1.5)]);
        let b = encode_key(&[Value::Float64(0.0)]);
        let c = encode_key(&[Value::Float64(2.25)]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn string_order_matches_byte_order() {
        let words = ["eight", "eighteen", "eighty", "fifty", "fifty one"];
        let encoded: Vec<Vec<u8>> = words.iter().map(|w| encode_key(&[Value::from(*w)])).collect();
        let mut sorted = encoded.clone();
        sorted.sort();
        assert_eq!(encoded, sorted);
    }

    #[test]
    fn null_sorts_first() {
        let null = encode_key(&[Value::Null]);
        let zero = encode_key(&[Value::Int64(i64::MIN)]);
        assert!(null < zero);
    }

    #[test]
    fn composite_order_is_lexicographic() {
        let a = encode_key(&[Value::Int64(1), Value::from("b")]);
        let b = encode_key(&[Value::Int64(1), Value::from("c")]);
        let c = encode_key(&[Value::Int64(2), Value::from("a")]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn single_key_does_not_match_longer_strings() {
        let bounds = KeySet::single_key(Key::of(["fifty"]))
            .bounds(&cols(&[ColumnType::String(None)]))
            .unwrap();
        assert!(bounds.contains(&encode_key(&[Value::from("fifty")])));
        assert!(!bounds.contains(&encode_key(&[Value::from("fifty one")])));
    }

    #[test]
    fn prefix_matches_longer_strings() {
        let bounds = KeySet::prefix_range(Key::of(["fifty"]))
            .bounds(&cols(&[ColumnType::String(None)]))
            .unwrap();
        assert!(bounds.contains(&encode_key(&[Value::from("fifty")])));
        assert!(bounds.contains(&encode_key(&[Value::from("fifty nine")])));
        assert!(!bounds.contains(&encode_key(&[Value::from("fift")])));
        assert!(!bounds.contains(&encode_key(&[Value::from("Fifty")])));
    }

    #[test]
    fn partial_key_matches_leading_component() {
        let columns = cols(&[ColumnType::Int64, ColumnType::Int64]);
        let bounds = KeySet::single_key(Key::of([7i64])).bounds(&columns).unwrap();
        assert!(bounds.contains(&encode_key(&[Value::Int64(7), Value::Int64(1)])));
        assert!(!bounds.contains(&encode_key(&[Value::Int64(8), Value::Int64(1)])));
    }

    #[test]
    fn range_bounds_honour_open_and_closed_ends() {
        let columns = cols(&[ColumnType::Int64]);
        let key = |i: i64| encode_key(&[Value::Int64(i)]);

        let closed = KeySet::range(KeyRange::closed_closed(Key::of([2i64]), Key::of([4i64])))
            .bounds(&columns)
            .unwrap();
        assert!(closed.contains(&key(2)) && closed.contains(&key(4)));
        assert!(!closed.contains(&key(5)));

        let open = KeySet::range(KeyRange::open_open(Key::of([2i64]), Key::of([4i64])))
            .bounds(&columns)
            .unwrap();
        assert!(!open.contains(&key(2)) && !open.contains(&key(4)));
        assert!(open.contains(&key(3)));
    }

    #[test]
    fn too_many_key_parts_is_invalid() {
        let err = KeySet::single_key(Key::of([1i64, 2]))
            .bounds(&cols(&[ColumnType::Int64]))
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn prefix_successor_works() {
        assert_eq!(prefix_successor(&[0x10, 0xAA, 0x00]), Some(vec![0x10, 0xAA, 0x01]));
        assert_eq!(prefix_successor(&[0x10, 0xFF]), Some(vec![0x11]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
    }
}
