use bytes::Bytes;

use crate::hash::Hash;

/// An immutable byte sequence addressed by the hash of its contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    hash: Hash,
    data: Bytes,
}

impl Chunk {
    /// Create a chunk, deriving its hash from `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self { hash: Hash::of(&data), data }
    }

    /// Create a chunk whose hash is already known. The caller vouches for
    /// the hash; use [`Chunk::verify`] when it comes from an untrusted peer.
    pub fn with_hash(hash: Hash, data: impl Into<Bytes>) -> Self {
        Self { hash, data: data.into() }
    }

    /// The chunk standing for "nothing here".
    pub fn empty() -> Self {
        Self { hash: Hash::empty(), data: Bytes::new() }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the recorded hash matches the bytes.
    pub fn verify(&self) -> bool {
        Hash::of(&self.data) == self.hash
    }
}
