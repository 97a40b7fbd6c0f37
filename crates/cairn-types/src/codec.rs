//! Value encoding: one value, one chunk.
//!
//! Chunks arrive from peers, so [`decode_chunk`] walks the framing with an
//! explicit stack before handing the bytes to bincode. Values nested deeper
//! than [`MAX_DEPTH`] are refused on both sides of the codec.

use bincode::Options;

use crate::chunk::Chunk;
use crate::error::TypeError;
use crate::hash::{Hash, HASH_LEN};
use crate::value::Value;

/// Deepest nesting a chunk may hold, counted separately for values and for
/// the type carried by each ref.
pub const MAX_DEPTH: usize = 256;

/// Encode a value into its chunk.
pub fn encode_value(value: &Value) -> Result<Chunk, TypeError> {
    let data = bincode::serialize(value).map_err(|e| TypeError::Serialization(e.to_string()))?;
    check_framing(&data).map_err(TypeError::Serialization)?;
    Ok(Chunk::new(data))
}

/// Decode a chunk back into the value it holds.
pub fn decode_chunk(chunk: &Chunk) -> Result<Value, TypeError> {
    if chunk.is_empty() {
        return Err(TypeError::EmptyChunk);
    }
    let decode_error = |reason: String| TypeError::Decode {
        hash: chunk.hash().to_string(),
        reason,
    };
    check_framing(chunk.data()).map_err(decode_error)?;
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(chunk.len() as u64)
        .deserialize(chunk.data())
        .map_err(|e| decode_error(e.to_string()))
}

/// Hash of the chunk `value` encodes to.
pub(crate) fn value_hash(value: &Value) -> Hash {
    // Serializing the in-memory value model cannot fail: every container
    // has a known length and every key is a plain value.
    match bincode::serialize(value) {
        Ok(data) => Hash::of(&data),
        Err(_) => Hash::empty(),
    }
}

// ---------------------------------------------------------------------------
// Framing scan
// ---------------------------------------------------------------------------

/// Smallest encoding of any value: a variant tag and a bool.
const MIN_VALUE_LEN: usize = 5;
/// Smallest encoding of a struct field: an empty name and a value.
const MIN_FIELD_LEN: usize = 8 + MIN_VALUE_LEN;

enum Item {
    Value(usize),
    Type(usize),
    Text,
    Fixed(usize),
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(format!("truncated at byte {}", self.pos));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn tag(&mut self) -> Result<u32, String> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, String> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// A length prefix for items at least `min_len` bytes long each.
    fn count(&mut self, min_len: usize) -> Result<usize, String> {
        let n = self.u64()?;
        let fits = (self.data.len() - self.pos) / min_len;
        match usize::try_from(n) {
            Ok(n) if n <= fits => Ok(n),
            _ => Err(format!("length {n} overruns chunk at byte {}", self.pos)),
        }
    }
}

/// Check that `data` is one well-framed value no deeper than [`MAX_DEPTH`].
///
/// The walk keeps its own stack so hostile input cannot exhaust the thread's.
fn check_framing(data: &[u8]) -> Result<(), String> {
    let mut cur = Cursor { data, pos: 0 };
    let mut stack = vec![Item::Value(1)];
    while let Some(item) = stack.pop() {
        match item {
            Item::Fixed(n) => {
                cur.take(n)?;
            }
            Item::Text => {
                let n = cur.count(1)?;
                cur.take(n)?;
            }
            Item::Value(depth) => {
                if depth > MAX_DEPTH {
                    return Err(format!("values nested deeper than {MAX_DEPTH}"));
                }
                match cur.tag()? {
                    0 => stack.push(Item::Fixed(1)),
                    1 => stack.push(Item::Fixed(8)),
                    2 | 3 => stack.push(Item::Text),
                    4 | 5 => {
                        let n = cur.count(MIN_VALUE_LEN)?;
                        stack.extend((0..n).map(|_| Item::Value(depth + 1)));
                    }
                    6 => {
                        let n = cur.count(2 * MIN_VALUE_LEN)?;
                        stack.extend((0..2 * n).map(|_| Item::Value(depth + 1)));
                    }
                    7 => {
                        let name = cur.count(1)?;
                        cur.take(name)?;
                        let n = cur.count(MIN_FIELD_LEN)?;
                        for _ in 0..n {
                            stack.push(Item::Value(depth + 1));
                            stack.push(Item::Text);
                        }
                    }
                    8 => {
                        cur.take(HASH_LEN)?;
                        stack.push(Item::Fixed(8));
                        stack.push(Item::Type(1));
                    }
                    tag => return Err(format!("unknown value tag {tag}")),
                }
            }
            Item::Type(depth) => {
                if depth > MAX_DEPTH {
                    return Err(format!("types nested deeper than {MAX_DEPTH}"));
                }
                match cur.tag()? {
                    0..=3 | 9 => {}
                    4 | 5 | 8 => stack.push(Item::Type(depth + 1)),
                    6 => {
                        stack.push(Item::Type(depth + 1));
                        stack.push(Item::Type(depth + 1));
                    }
                    7 => stack.push(Item::Text),
                    tag => return Err(format!("unknown type tag {tag}")),
                }
            }
        }
    }
    if cur.pos != data.len() {
        return Err(format!("{} trailing bytes", data.len() - cur.pos));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Ref, Struct};

    #[test]
    fn chunk_hash_matches_ref_target() {
        let v = Value::from(Struct::new("S").with("n", Value::Number(7)));
        let chunk = encode_value(&v).unwrap();
        assert_eq!(chunk.hash(), Ref::new(&v).target());
    }

    #[test]
    fn decode_restores_value() {
        let leaf = Ref::new(&Value::from("leaf"));
        let v = Value::map([(Value::from("k"), Value::Ref(leaf))]);
        let chunk = encode_value(&v).unwrap();
        assert_eq!(decode_chunk(&chunk).unwrap(), v);
    }

    #[test]
    fn empty_chunk_does_not_decode() {
        assert_eq!(decode_chunk(&Chunk::empty()), Err(TypeError::EmptyChunk));
    }

    #[test]
    fn garbage_reports_decode_error() {
        let chunk = Chunk::new(vec![0xff; 3]);
        assert!(matches!(decode_chunk(&chunk), Err(TypeError::Decode { .. })));
    }

    #[test]
    fn deep_list_chunk_is_rejected_without_recursing() {
        let mut data = Vec::new();
        for _ in 0..200_000 {
            data.extend_from_slice(&4u32.to_le_bytes());
            data.extend_from_slice(&1u64.to_le_bytes());
        }
        data.extend_from_slice(&0u32.to_le_bytes());
        data.push(1);
        let err = decode_chunk(&Chunk::new(data)).unwrap_err();
        assert!(matches!(err, TypeError::Decode { ref reason, .. } if reason.contains("nested")));
    }

    fn nested_lists(levels: usize) -> Value {
        (0..levels).fold(Value::Bool(true), |inner, _| Value::list([inner]))
    }

    #[test]
    fn nesting_up_to_the_limit_round_trips() {
        let v = nested_lists(MAX_DEPTH - 1);
        let chunk = encode_value(&v).unwrap();
        assert_eq!(decode_chunk(&chunk).unwrap(), v);
    }

    #[test]
    fn nesting_past_the_limit_is_not_encoded() {
        let v = nested_lists(MAX_DEPTH);
        assert!(matches!(encode_value(&v), Err(TypeError::Serialization(_))));
    }

    #[test]
    fn deep_ref_type_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&[7u8; HASH_LEN]);
        for _ in 0..10_000 {
            data.extend_from_slice(&4u32.to_le_bytes());
        }
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        assert!(matches!(decode_chunk(&Chunk::new(data)), Err(TypeError::Decode { .. })));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(decode_chunk(&Chunk::new(data)), Err(TypeError::Decode { .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let chunk = encode_value(&Value::Number(3)).unwrap();
        let mut data = chunk.data().to_vec();
        data.push(0);
        assert!(matches!(decode_chunk(&Chunk::new(data)), Err(TypeError::Decode { .. })));
    }

    #[test]
    fn encoding_is_deterministic_for_sets() {
        let a = Value::set([Value::Number(2), Value::Number(1)]);
        let b = Value::set([Value::Number(1), Value::Number(2)]);
        assert_eq!(encode_value(&a).unwrap().hash(), encode_value(&b).unwrap().hash());
    }
}
