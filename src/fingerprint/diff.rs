// Fingerprint comparison.
//
// Two fingerprints are comparable only when they describe the same chunk
// layout: equal chunk counts (same file size) and equal chunk sizes. A
// block patch cannot represent a size change; the caller must fall back to
// a full transfer on mismatch.

use thiserror::Error;

use crate::fingerprint::Fingerprint;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The two fingerprints describe different chunk layouts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompareError {
    #[error(
        "chunk count mismatch: old fingerprint has {old} chunks, new has {new} \
         (file sizes differ; a block patch cannot apply, fall back to a full transfer)"
    )]
    ChunkCountMismatch { old: u64, new: u64 },
    #[error("chunk size mismatch: old fingerprint uses {old}-byte chunks, new uses {new}")]
    ChunkSizeMismatch { old: u64, new: u64 },
}

// ---------------------------------------------------------------------------
// Compare
// ---------------------------------------------------------------------------

/// Compare `old` against `new`, returning the ascending list of chunk
/// indices whose digests differ. An empty list means the file is unchanged.
pub fn compare(old: &Fingerprint, new: &Fingerprint) -> Result<Vec<u64>, CompareError> {
    if old.chunk_size() != new.chunk_size() {
        return Err(CompareError::ChunkSizeMismatch {
            old: old.chunk_size(),
            new: new.chunk_size(),
        });
    }
    if old.chunk_count() != new.chunk_count() {
        return Err(CompareError::ChunkCountMismatch {
            old: old.chunk_count(),
            new: new.chunk_count(),
        });
    }

    let differing = old
        .iter()
        .zip(new.iter())
        .filter(|((_, old_digest), (_, new_digest))| old_digest != new_digest)
        .map(|((index, _), _)| index)
        .collect();
    Ok(differing)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
