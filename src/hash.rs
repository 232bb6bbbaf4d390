use murmur3::murmur3_32;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// How bit positions are derived from a canonical element.
///
/// `Murmur` is the fast path: one murmur3 pass per hash function, with the
/// function index used as seed. `Digest` slices a SHA-256 digest into 32-bit
/// windows and is kept for environments where a cryptographic hash is
/// preferred (or murmur is unavailable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrategy {
    #[default]
    Murmur,
    Digest,
}

impl HashStrategy {
    /// Computes `num_hashes` positions in `[0, size)` for `item`.
    pub fn positions(self, item: &[u8], num_hashes: usize, size: usize) -> Vec<usize> {
        match self {
            HashStrategy::Murmur => murmur_positions(item, num_hashes, size)
                .unwrap_or_else(|| digest_positions(item, num_hashes, size)),
            HashStrategy::Digest => digest_positions(item, num_hashes, size),
        }
    }
}

pub(crate) fn hash_murmur32(key: &[u8], seed: u32) -> Option<u32> {
    let mut cursor = Cursor::new(key);
    murmur3_32(&mut cursor, seed).ok()
}

/// Seeded murmur3 per hash function. Returns `None` if the hasher fails,
/// in which case callers fall back to [`digest_positions`].
pub fn murmur_positions(
    item: &[u8],
    num_hashes: usize,
    size: usize,
) -> Option<Vec<usize>> {
    (0..num_hashes)
        .map(|i| hash_murmur32(item, i as u32).map(|h| h as usize % size))
        .collect()
}

/// SHA-256 of the item, cut into big-endian 32-bit windows. When more than
/// eight windows are needed the digest is extended with
/// `SHA-256(item || counter)` blocks.
pub fn digest_positions(item: &[u8], num_hashes: usize, size: usize) -> Vec<usize> {
    let mut material = Sha256::digest(item).to_vec();
    let mut counter: u32 = 1;
    while material.len() < num_hashes * 4 {
        let mut hasher = Sha256::new();
        hasher.update(item);
        hasher.update(counter.to_be_bytes());
        material.extend_from_slice(&hasher.finalize());
        counter += 1;
    }

    material
        .chunks_exact(4)
        .take(num_hashes)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]) as usize % size)
        .collect()
}

/// Number of bits needed to hold `n` elements at false positive rate `fpr`:
/// `ceil(-(n * ln fpr) / ln(2)^2)`.
pub fn optimal_size(n: usize, fpr: f64) -> usize {
    let ln2 = std::f64::consts::LN_2;
    ((-(n as f64) * fpr.ln()) / (ln2 * ln2)).ceil() as usize
}

/// `max(1, round((m / n) * ln 2))`
pub fn optimal_hash_count(m: usize, n: usize) -> usize {
    let k = ((m as f64 / n as f64) * std::f64::consts::LN_2).round() as usize;
    k.max(1)
}
