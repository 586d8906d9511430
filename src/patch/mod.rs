// Patches: raw replacement bytes for the chunks that changed.
//
// A patch maps a subset of chunk indices to the current bytes of those
// chunks, plus the chunk size the indices refer to. Entry lengths are
// validated at construction: every entry is exactly one chunk except the
// highest-indexed one, which may carry the file's trailing remainder. A
// patch is built once per reconciliation, transmitted, applied, and
// discarded.
//
// - `build` — read changed chunks out of the source file
// - `codec` — compressed binary envelope, whole-patch and streaming
// - `apply` — overwrite the target's chunks in place or via shadow copy

use std::collections::BTreeMap;

use thiserror::Error;

pub mod apply;
pub mod build;
pub mod codec;

pub use apply::{ApplyError, apply, apply_in_place};
pub use build::{PatchBuildError, build};
pub use codec::{
    DEFAULT_COMPRESSION_LEVEL, PatchCodecError, PatchReader, PatchWriter, decode, encode,
};

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Replacement bytes for a set of changed chunks, keyed by chunk index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    chunk_size: u64,
    entries: BTreeMap<u64, Vec<u8>>,
}

/// Constraint violation while assembling a patch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidPatch {
    #[error("patch chunk size must be non-zero")]
    ZeroChunkSize,
    #[error("patch entry for chunk {index} is empty")]
    EmptyEntry { index: u64 },
    #[error("patch entry for chunk {index} is {len} bytes, larger than the {chunk_size}-byte chunk size")]
    OversizedEntry { index: u64, len: u64, chunk_size: u64 },
    #[error(
        "patch entry for chunk {index} is {len} bytes but only the final chunk \
         (here {last}) may be shorter than the {chunk_size}-byte chunk size"
    )]
    ShortNonFinalEntry {
        index: u64,
        len: u64,
        chunk_size: u64,
        last: u64,
    },
}

impl Patch {
    /// Assemble a patch from `(index, bytes)` entries, validating the
    /// entry-length invariants. The empty patch is valid.
    pub fn from_entries(
        chunk_size: u64,
        entries: impl IntoIterator<Item = (u64, Vec<u8>)>,
    ) -> Result<Self, InvalidPatch> {
        if chunk_size == 0 {
            return Err(InvalidPatch::ZeroChunkSize);
        }
        let entries: BTreeMap<u64, Vec<u8>> = entries.into_iter().collect();
        if let Some(last) = entries.keys().next_back().copied() {
            for (&index, bytes) in &entries {
                let len = bytes.len() as u64;
                if len == 0 {
                    return Err(InvalidPatch::EmptyEntry { index });
                }
                if len > chunk_size {
                    return Err(InvalidPatch::OversizedEntry {
                        index,
                        len,
                        chunk_size,
                    });
                }
                if len < chunk_size && index != last {
                    return Err(InvalidPatch::ShortNonFinalEntry {
                        index,
                        len,
                        chunk_size,
                        last,
                    });
                }
            }
        }
        Ok(Self {
            chunk_size,
            entries,
        })
    }

    /// Chunk size the entry indices refer to.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunk entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes across all entries.
    pub fn payload_size(&self) -> u64 {
        self.entries.values().map(|b| b.len() as u64).sum()
    }

    /// Iterate `(index, bytes)` entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.entries.iter().map(|(&i, b)| (i, b.as_slice()))
    }

    /// Chunk indices present, ascending.
    pub fn indices(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_entries_are_accepted() {
        let patch =
            Patch::from_entries(4, vec![(0, vec![1; 4]), (5, vec![2; 4])]).unwrap();
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.payload_size(), 8);
        assert_eq!(patch.indices().collect::<Vec<_>>(), vec![0, 5]);
    }

    #[test]
    fn short_final_entry_is_accepted() {
        let patch =
            Patch::from_entries(4, vec![(0, vec![1; 4]), (7, vec![2; 3])]).unwrap();
        assert_eq!(patch.iter().last().unwrap().1.len(), 3);
    }

    #[test]
    fn short_non_final_entry_is_rejected() {
        let err =
            Patch::from_entries(4, vec![(0, vec![1; 3]), (7, vec![2; 4])]).unwrap_err();
        assert!(matches!(err, InvalidPatch::ShortNonFinalEntry { index: 0, .. }));
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let err = Patch::from_entries(4, vec![(0, vec![1; 5])]).unwrap_err();
        assert!(matches!(err, InvalidPatch::OversizedEntry { index: 0, .. }));
    }

    #[test]
    fn empty_entry_is_rejected() {
        let err = Patch::from_entries(4, vec![(0, Vec::new())]).unwrap_err();
        assert_eq!(err, InvalidPatch::EmptyEntry { index: 0 });
    }

    #[test]
    fn empty_patch_is_valid() {
        let patch = Patch::from_entries(4, Vec::new()).unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.payload_size(), 0);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert_eq!(
            Patch::from_entries(0, Vec::new()),
            Err(InvalidPatch::ZeroChunkSize)
        );
    }
}
