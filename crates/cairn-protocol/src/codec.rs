//! Binary framing for hash lists and chunk streams.
//!
//! - Hash list: `[u32 BE count][count x 32-byte digest]`
//! - Chunk stream: repeated `[32-byte hash][u32 BE length][bytes]` records
//!   until the end of the body
//! - `writeValue` body: a hash list of hints followed by a chunk stream

use bytes::{Buf, BufMut, Bytes, BytesMut};
use cairn_chunks::Hints;
use cairn_types::{Chunk, Hash, HASH_LEN};

use crate::endpoint::MAX_BODY_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Append a length-prefixed list of hashes.
pub fn put_hash_list<'a>(buf: &mut BytesMut, hashes: impl ExactSizeIterator<Item = &'a Hash>) {
    buf.put_u32(hashes.len() as u32);
    for h in hashes {
        buf.put_slice(h.as_bytes());
    }
}

/// Encode a hash list on its own.
pub fn encode_hash_list<'a>(hashes: impl ExactSizeIterator<Item = &'a Hash>) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + hashes.len() * HASH_LEN);
    put_hash_list(&mut buf, hashes);
    buf.freeze()
}

/// Read a hash list from the front of `buf`, advancing past it.
pub fn get_hash_list(buf: &mut Bytes) -> ProtocolResult<Vec<Hash>> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::FramingError("hash list: missing count".into()));
    }
    let count = buf.get_u32() as usize;
    let need = count
        .checked_mul(HASH_LEN)
        .ok_or_else(|| ProtocolError::FramingError("hash list: count overflow".into()))?;
    if buf.remaining() < need {
        return Err(ProtocolError::FramingError(format!(
            "hash list: have {} bytes, need {need}",
            buf.remaining()
        )));
    }
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        let digest = buf.split_to(HASH_LEN);
        hashes.push(Hash::from_slice(&digest)?);
    }
    Ok(hashes)
}

/// Decode a body that is exactly one hash list.
pub fn decode_hash_list(body: Bytes) -> ProtocolResult<Vec<Hash>> {
    let mut buf = body;
    let hashes = get_hash_list(&mut buf)?;
    if buf.has_remaining() {
        return Err(ProtocolError::FramingError(format!(
            "{} trailing bytes after hash list",
            buf.remaining()
        )));
    }
    Ok(hashes)
}

/// Append one chunk record.
pub fn put_chunk(buf: &mut BytesMut, chunk: &Chunk) {
    buf.reserve(HASH_LEN + 4 + chunk.len());
    buf.put_slice(chunk.hash().as_bytes());
    buf.put_u32(chunk.len() as u32);
    buf.put_slice(chunk.data());
}

/// Encode a sequence of chunks as a chunk stream.
pub fn encode_chunks<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Bytes {
    let mut buf = BytesMut::new();
    for chunk in chunks {
        put_chunk(&mut buf, chunk);
    }
    buf.freeze()
}

/// Iterates over the chunks of a chunk stream, verifying each one's hash.
///
/// Yields chunks in stream order; stops after the first error.
pub struct ChunkReader {
    buf: Bytes,
    failed: bool,
}

impl ChunkReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf, failed: false }
    }

    fn next_chunk(&mut self) -> ProtocolResult<Chunk> {
        if self.buf.remaining() < HASH_LEN + 4 {
            return Err(ProtocolError::FramingError(format!(
                "truncated chunk header: {} bytes",
                self.buf.remaining()
            )));
        }
        let hash = Hash::from_slice(&self.buf.split_to(HASH_LEN))?;
        let len = self.buf.get_u32() as usize;
        if len > MAX_BODY_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_BODY_SIZE,
            });
        }
        if self.buf.remaining() < len {
            return Err(ProtocolError::FramingError(format!(
                "chunk {hash}: have {} bytes, need {len}",
                self.buf.remaining()
            )));
        }
        let chunk = Chunk::with_hash(hash, self.buf.split_to(len));
        if !chunk.verify() {
            return Err(ProtocolError::HashMismatch {
                expected: hash,
                computed: Hash::of(chunk.data()),
            });
        }
        Ok(chunk)
    }
}

impl Iterator for ChunkReader {
    type Item = ProtocolResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || !self.buf.has_remaining() {
            return None;
        }
        let item = self.next_chunk();
        self.failed = item.is_err();
        Some(item)
    }
}

/// Decode a whole chunk stream.
pub fn decode_chunks(body: Bytes) -> ProtocolResult<Vec<Chunk>> {
    ChunkReader::new(body).collect()
}

/// Encode a `writeValue` body: hints, then chunks. Not compressed.
pub fn encode_write_body<'a>(hints: &Hints, chunks: impl IntoIterator<Item = &'a Chunk>) -> Bytes {
    let mut buf = BytesMut::new();
    put_hash_list(&mut buf, hints.iter());
    for chunk in chunks {
        put_chunk(&mut buf, chunk);
    }
    buf.freeze()
}

/// Split a decompressed `writeValue` body into its hints and a reader over
/// its chunks.
pub fn decode_write_body(body: Bytes) -> ProtocolResult<(Hints, ChunkReader)> {
    let mut buf = body;
    let hints = get_hash_list(&mut buf)?.into_iter().collect();
    Ok((hints, ChunkReader::new(buf)))
}
