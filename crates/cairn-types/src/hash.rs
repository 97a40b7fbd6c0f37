use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of bytes in a [`Hash`].
pub const HASH_LEN: usize = 32;

/// Content digest of a chunk's bytes.
///
/// A `Hash` is the BLAKE3 digest of a chunk. Identical bytes always produce
/// the same `Hash`, which makes chunks deduplicatable and verifiable. The
/// all-zero hash is the "empty" sentinel meaning "no chunk".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// Compute the hash of raw bytes.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed digest.
    pub const fn from_digest(digest: [u8; HASH_LEN]) -> Self {
        Self(digest)
    }

    /// The empty hash (all zeros). Represents "no chunk".
    pub const fn empty() -> Self {
        Self([0u8; HASH_LEN])
    }

    /// Returns `true` if this is the empty hash.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Build a hash from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let digest: [u8; HASH_LEN] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(digest))
    }

    /// Short hex representation (first 8 characters), for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse the canonical string form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Parse the canonical string form, treating the empty string as
    /// [`Hash::empty`].
    pub fn parse_or_empty(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Ok(Self::empty());
        }
        Self::parse(s)
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::str::FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn of_is_deterministic() {
        assert_eq!(Hash::of(b"hello world"), Hash::of(b"hello world"));
        assert_ne!(Hash::of(b"hello"), Hash::of(b"world"));
    }

    #[test]
    fn empty_is_all_zeros() {
        let empty = Hash::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.as_bytes(), &[0u8; HASH_LEN]);
        assert_eq!(Hash::default(), empty);
        assert!(!Hash::of(b"").is_empty());
    }

    #[test]
    fn display_is_full_hex() {
        let h = Hash::of(b"test");
        let s = h.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(Hash::parse(&s).unwrap(), h);
        assert_eq!(h.short().len(), 8);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(Hash::parse("zz"), Err(TypeError::InvalidHex(_))));
        assert_eq!(
            Hash::parse("abcd"),
            Err(TypeError::InvalidLength { expected: 32, actual: 2 })
        );
    }

    #[test]
    fn parse_or_empty_accepts_blank() {
        assert_eq!(Hash::parse_or_empty("").unwrap(), Hash::empty());
    }

    #[test]
    fn serde_roundtrip() {
        let h = Hash::of(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let parsed: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, parsed);
    }

    proptest! {
        #[test]
        fn string_form_roundtrips(bytes in proptest::array::uniform32(any::<u8>())) {
            let h = Hash::from_digest(bytes);
            prop_assert_eq!(h.to_string().parse::<Hash>().unwrap(), h);
        }

        #[test]
        fn order_follows_bytes(a in proptest::array::uniform32(any::<u8>()),
                               b in proptest::array::uniform32(any::<u8>())) {
            prop_assert_eq!(Hash::from_digest(a).cmp(&Hash::from_digest(b)), a.cmp(&b));
        }
    }
}
