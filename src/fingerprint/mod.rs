// Fingerprints: ordered chunk-index → digest summaries of a file.
//
// A fingerprint records one digest per chunk, indices 0..N contiguous with
// no gaps, plus the chunk size it was computed with. It is immutable once
// built. Two fingerprints are only comparable when both chunk count and
// chunk size match.
//
// - `build` — sequential and parallel digesting of a file
// - `codec` — binary envelope (de)serialization
// - `diff`  — comparison, yielding the ascending list of changed indices

use thiserror::Error;

use crate::digest::ChunkDigest;

pub mod build;
pub mod codec;
pub mod diff;

pub use build::{BuildOptions, FingerprintError, build, build_with_options};
pub use codec::FingerprintCodecError;
pub use diff::{CompareError, compare};

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// A complete chunk-index → digest mapping for one file at one point in
/// time.
///
/// The invariant — exactly one digest per index in `0..chunk_count()`, none
/// beyond — is enforced at construction; the backing store is a dense `Vec`
/// indexed by chunk index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    chunk_size: u64,
    digests: Vec<ChunkDigest>,
}

/// Constraint violation while assembling a fingerprint from keyed entries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidFingerprint {
    #[error("fingerprint indices are not contiguous: expected {expected}, found {found}")]
    NonContiguous { expected: u64, found: u64 },
    #[error("fingerprint chunk size must be non-zero")]
    ZeroChunkSize,
}

impl Fingerprint {
    /// Build from an already-dense digest vector (element `i` is chunk `i`).
    pub(crate) fn from_digests(chunk_size: u64, digests: Vec<ChunkDigest>) -> Self {
        debug_assert!(chunk_size > 0);
        Self {
            chunk_size,
            digests,
        }
    }

    /// Build from `(index, digest)` entries in ascending index order,
    /// validating that the indices are exactly `0..len` with no gaps or
    /// duplicates.
    pub fn from_entries(
        chunk_size: u64,
        entries: impl IntoIterator<Item = (u64, ChunkDigest)>,
    ) -> Result<Self, InvalidFingerprint> {
        if chunk_size == 0 {
            return Err(InvalidFingerprint::ZeroChunkSize);
        }
        let mut digests = Vec::new();
        for (index, digest) in entries {
            let expected = digests.len() as u64;
            if index != expected {
                return Err(InvalidFingerprint::NonContiguous {
                    expected,
                    found: index,
                });
            }
            digests.push(digest);
        }
        Ok(Self {
            chunk_size,
            digests,
        })
    }

    /// Chunk size this fingerprint was computed with.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks covered.
    pub fn chunk_count(&self) -> u64 {
        self.digests.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Digest of chunk `index`, if in range.
    pub fn digest(&self, index: u64) -> Option<&ChunkDigest> {
        usize::try_from(index).ok().and_then(|i| self.digests.get(i))
    }

    /// Iterate `(index, digest)` pairs in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &ChunkDigest)> {
        self.digests.iter().enumerate().map(|(i, d)| (i as u64, d))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::chunk_digest;

    #[test]
    fn from_entries_accepts_contiguous() {
        let entries = vec![(0, chunk_digest(b"a")), (1, chunk_digest(b"b"))];
        let fp = Fingerprint::from_entries(4, entries).unwrap();
        assert_eq!(fp.chunk_count(), 2);
        assert_eq!(fp.digest(0), Some(&chunk_digest(b"a")));
        assert_eq!(fp.digest(1), Some(&chunk_digest(b"b")));
        assert_eq!(fp.digest(2), None);
    }

    #[test]
    fn from_entries_rejects_gap() {
        let entries = vec![(0, chunk_digest(b"a")), (2, chunk_digest(b"b"))];
        assert_eq!(
            Fingerprint::from_entries(4, entries),
            Err(InvalidFingerprint::NonContiguous {
                expected: 1,
                found: 2
            })
        );
    }

    #[test]
    fn from_entries_rejects_duplicate() {
        let entries = vec![(0, chunk_digest(b"a")), (0, chunk_digest(b"b"))];
        assert!(Fingerprint::from_entries(4, entries).is_err());
    }

    #[test]
    fn from_entries_rejects_zero_chunk_size() {
        assert_eq!(
            Fingerprint::from_entries(0, Vec::new()),
            Err(InvalidFingerprint::ZeroChunkSize)
        );
    }

    #[test]
    fn empty_fingerprint_is_valid() {
        let fp = Fingerprint::from_entries(4, Vec::new()).unwrap();
        assert!(fp.is_empty());
        assert_eq!(fp.chunk_count(), 0);
    }

    #[test]
    fn iter_yields_ascending_indices() {
        let fp = Fingerprint::from_digests(4, vec![chunk_digest(b"x"), chunk_digest(b"y")]);
        let indices: Vec<u64> = fp.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1]);
    }
}
