//! Content hashing over normalized text.
//!
//! SHA-256 when the deployment allows crypto; a deterministic djb2-xor
//! variant otherwise. The algorithm is recorded alongside the digest so
//! readers never have to guess.

use sha2::{Digest, Sha256};

use quarry_core::config::HashAlgorithm;

/// A content digest plus the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    pub hex: String,
    pub algorithm: HashAlgorithm,
}

impl ContentHash {
    /// `<algo>:<hex>` form used in storage columns.
    pub fn tagged(&self) -> String {
        format!("{}:{}", self.algorithm.as_str(), self.hex)
    }
}

/// Hash normalized text with the configured algorithm.
pub fn content_hash(text: &str, algorithm: HashAlgorithm) -> ContentHash {
    let hex = match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();
            let mut out = String::with_capacity(64);
            for byte in digest {
                out.push_str(&format!("{byte:02x}"));
            }
            out
        }
        HashAlgorithm::Djb2 => format!("{:016x}", djb2(text.as_bytes())),
    };
    ContentHash { hex, algorithm }
}

/// djb2 xor variant, widened to 64 bits.
fn djb2(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in bytes {
        hash = (hash << 5).wrapping_add(hash) ^ u64::from(b);
    }
    hash
}
