//! Gzip helpers for request and response bodies.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::endpoint::MAX_BODY_SIZE;
use crate::error::{ProtocolError, ProtocolResult};

/// Value of `Content-Encoding` / `Accept-Encoding` for gzip bodies.
pub const GZIP: &str = "gzip";

pub fn gzip(data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a gzip body, refusing to inflate past [`MAX_BODY_SIZE`].
pub fn gunzip(data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    let limit = MAX_BODY_SIZE as u64 + 1;
    GzDecoder::new(data).take(limit).read_to_end(&mut out)?;
    if out.len() > MAX_BODY_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: out.len(),
            max: MAX_BODY_SIZE,
        });
    }
    Ok(out)
}

/// Returns `true` if an `Accept-Encoding` or `Content-Encoding` header
/// value names gzip.
pub fn names_gzip(header: &str) -> bool {
    header
        .split(',')
        .any(|part| part.split(';').next().map(str::trim) == Some(GZIP))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_then_gunzip() {
        let data = b"the same words the same words the same words".repeat(20);
        let packed = gzip(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(gunzip(&packed).unwrap(), data);
    }

    #[test]
    fn gunzip_rejects_garbage() {
        assert!(gunzip(b"not gzip at all").is_err());
    }

    #[test]
    fn header_matching() {
        assert!(names_gzip("gzip"));
        assert!(names_gzip("deflate, gzip;q=0.8"));
        assert!(!names_gzip("identity"));
        assert!(!names_gzip("x-gzip-ish"));
    }
}
