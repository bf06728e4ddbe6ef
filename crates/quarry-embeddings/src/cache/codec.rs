//! Vector blob codec for tiers 2 and 3: little-endian f32, optionally
//! zstd-compressed.

use quarry_core::errors::{CacheError, QuarryResult};

const ZSTD_LEVEL: i32 = 3;

/// Encode a vector, compressing when asked. Falls back to the raw blob if
/// compression fails (it never should on in-memory buffers).
pub fn encode(vector: &[f32], compress: bool) -> (Vec<u8>, bool) {
    let mut raw = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        raw.extend_from_slice(&v.to_le_bytes());
    }
    if compress {
        match zstd::stream::encode_all(raw.as_slice(), ZSTD_LEVEL) {
            Ok(compressed) => (compressed, true),
            Err(_) => (raw, false),
        }
    } else {
        (raw, false)
    }
}

pub fn decode(blob: &[u8], compressed: bool) -> QuarryResult<Vec<f32>> {
    let raw = if compressed {
        zstd::stream::decode_all(blob).map_err(|e| CacheError::Codec {
            reason: format!("zstd decode: {e}"),
        })?
    } else {
        blob.to_vec()
    };
    if raw.len() % 4 != 0 {
        return Err(CacheError::Codec {
            reason: format!("blob length {} not a multiple of 4", raw.len()),
        }
        .into());
    }
    Ok(raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        let v = vec![0.5f32, -1.25, 3.0];
        let (blob, compressed) = encode(&v, false);
        assert!(!compressed);
        assert_eq!(decode(&blob, compressed).unwrap(), v);
    }

    #[test]
    fn compressed_roundtrip() {
        let v: Vec<f32> = (0..384).map(|i| (i % 7) as f32 * 0.1).collect();
        let (blob, compressed) = encode(&v, true);
        assert!(compressed);
        assert!(blob.len() < v.len() * 4, "repetitive data should shrink");
        assert_eq!(decode(&blob, compressed).unwrap(), v);
    }

    #[test]
    fn truncated_blob_is_an_error() {
        assert!(decode(&[1, 2, 3], false).is_err());
    }
}
