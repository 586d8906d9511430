// Patch construction: read the current bytes of changed chunks.
//
// For each differing index the source file is seeked to `index * C` and the
// chunk body read in full (the trailing remainder for the final chunk). A
// changed chunk is always carried whole — no intra-chunk delta is computed;
// retransmitting the full block keeps the format trivial and the read path
// a single seek.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::chunk::ChunkLayout;
use crate::patch::codec::{PatchCodecError, PatchWriter};
use crate::patch::{InvalidPatch, Patch};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while building a patch from a source file.
#[derive(Debug, Error)]
pub enum PatchBuildError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: io::Error,
    },
    #[error("read failed at chunk {index} (offset {offset}) of {}: {source}", path.display())]
    Read {
        path: PathBuf,
        index: u64,
        offset: u64,
        source: io::Error,
    },
    #[error("chunk {index} is out of range: {} has only {chunks} chunks", path.display())]
    IndexOutOfRange {
        path: PathBuf,
        index: u64,
        chunks: u64,
    },
    #[error(transparent)]
    Invalid(#[from] InvalidPatch),
    #[error(transparent)]
    Codec(#[from] PatchCodecError),
}

// ---------------------------------------------------------------------------
// In-memory build
// ---------------------------------------------------------------------------

/// Read the chunks named by `indices` out of `path` into a patch.
///
/// `indices` comes from comparing a stale fingerprint against the file's
/// current one; it must be ascending and in range for the file's layout.
pub fn build(path: &Path, chunk_size: u64, indices: &[u64]) -> Result<Patch, PatchBuildError> {
    let mut entries = Vec::with_capacity(indices.len());
    read_chunks(path, chunk_size, indices, |index, bytes| {
        entries.push((index, bytes.to_vec()));
        Ok(())
    })?;
    Ok(Patch::from_entries(chunk_size, entries)?)
}

// ---------------------------------------------------------------------------
// Streaming build
// ---------------------------------------------------------------------------

/// Read the chunks named by `indices` and stream them straight into a
/// compressed patch envelope on `writer`, holding one chunk in memory at a
/// time. Returns the writer once the envelope is finished.
pub fn build_to<W: Write>(
    path: &Path,
    chunk_size: u64,
    indices: &[u64],
    writer: W,
    level: i32,
) -> Result<W, PatchBuildError> {
    let mut patch_writer = PatchWriter::new(writer, chunk_size, indices.len() as u64, level)?;
    read_chunks(path, chunk_size, indices, |index, bytes| {
        patch_writer.write_entry(index, bytes).map_err(Into::into)
    })?;
    Ok(patch_writer.finish()?)
}

// ---------------------------------------------------------------------------
// Shared read loop
// ---------------------------------------------------------------------------

fn read_chunks(
    path: &Path,
    chunk_size: u64,
    indices: &[u64],
    mut sink: impl FnMut(u64, &[u8]) -> Result<(), PatchBuildError>,
) -> Result<(), PatchBuildError> {
    let open_err = |source| PatchBuildError::Open {
        path: path.to_owned(),
        source,
    };
    let layout = ChunkLayout::of_file(path, chunk_size).map_err(open_err)?;
    let mut file = File::open(path).map_err(open_err)?;

    debug!(
        "building patch from {}: {} of {} chunks",
        path.display(),
        indices.len(),
        layout.chunk_count()
    );

    let mut buf = vec![0u8; chunk_size as usize];
    for &index in indices {
        if !layout.contains(index) {
            return Err(PatchBuildError::IndexOutOfRange {
                path: path.to_owned(),
                index,
                chunks: layout.chunk_count(),
            });
        }
        let offset = layout.offset_of(index);
        let len = layout.len_of(index) as usize;
        let read_err = |source| PatchBuildError::Read {
            path: path.to_owned(),
            index,
            offset,
            source,
        };
        file.seek(SeekFrom::Start(offset)).map_err(read_err)?;
        file.read_exact(&mut buf[..len]).map_err(read_err)?;
        sink(index, &buf[..len])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::codec;

    fn temp_file(data: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        f
    }

    #[test]
    fn reads_named_chunks() {
        let f = temp_file(b"aaaabbbbccccdd"); // 14 bytes, chunk size 4
        let patch = build(f.path(), 4, &[1, 3]).unwrap();
        let entries: Vec<_> = patch.iter().map(|(i, b)| (i, b.to_vec())).collect();
        assert_eq!(entries, vec![(1, b"bbbb".to_vec()), (3, b"dd".to_vec())]);
    }

    #[test]
    fn empty_index_list_yields_empty_patch() {
        let f = temp_file(b"aaaabbbb");
        let patch = build(f.path(), 4, &[]).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let f = temp_file(b"aaaabbbb");
        let err = build(f.path(), 4, &[2]).unwrap_err();
        assert!(matches!(
            err,
            PatchBuildError::IndexOutOfRange {
                index: 2,
                chunks: 2,
                ..
            }
        ));
    }

    #[test]
    fn missing_file_reports_open_error() {
        let err = build(Path::new("/nonexistent/blocksync-patch"), 4, &[0]).unwrap_err();
        assert!(matches!(err, PatchBuildError::Open { .. }));
    }

    #[test]
    fn streamed_build_matches_in_memory_build() {
        let f = temp_file(b"aaaabbbbccccdd");
        let patch = build(f.path(), 4, &[0, 3]).unwrap();
        let whole = codec::encode(&patch).unwrap();

        let streamed = build_to(
            f.path(),
            4,
            &[0, 3],
            Vec::new(),
            codec::DEFAULT_COMPRESSION_LEVEL,
        )
        .unwrap();
        assert_eq!(streamed, whole);
    }
}
