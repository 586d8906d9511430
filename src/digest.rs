// Per-chunk content digests.
//
// SHA-1 of the chunk's bytes: 160 bits, deterministic, collisions
// astronomically unlikely at disk-image scale. Used purely for change
// detection, not as a security primitive.

use sha1::{Digest, Sha1};

/// Digest length in bytes (160 bits).
pub const DIGEST_LEN: usize = 20;

/// A chunk's content digest.
pub type ChunkDigest = [u8; DIGEST_LEN];

/// Digest one chunk's bytes.
pub fn chunk_digest(data: &[u8]) -> ChunkDigest {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}
