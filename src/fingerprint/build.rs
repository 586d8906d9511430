// Fingerprint construction: digest every chunk of a file.
//
// Small files are digested sequentially through the `Chunker`. Larger ones
// are split across a bounded group of scoped worker threads, each owning a
// private read-only handle to the file and digesting a contiguous index
// range via seek + read. Workers share no mutable state; reads are disjoint,
// so the file needs no locking.
//
// The build is all-or-nothing: any worker's I/O failure aborts the whole
// fingerprint and reports the offending chunk and byte offset.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::thread;

use log::debug;
use thiserror::Error;

use crate::chunk::{ChunkLayout, Chunker, DEFAULT_CHUNK_SIZE};
use crate::digest::{ChunkDigest, chunk_digest};
use crate::fingerprint::Fingerprint;

/// Below this many chunks, parallel workers are not worth spawning.
const PARALLEL_THRESHOLD: u64 = 13;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while fingerprinting a file.
#[derive(Debug, Error)]
pub enum FingerprintError {
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
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Tuning for a fingerprint build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Chunk size in bytes.
    pub chunk_size: u64,
    /// Worker thread count; `None` derives it from available parallelism
    /// (`max(1, parallelism / 2)`).
    pub workers: Option<usize>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: None,
        }
    }
}

fn default_workers() -> usize {
    let parallelism = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (parallelism / 2).max(1)
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// Fingerprint `path` with default options (4 MiB chunks, auto workers).
pub fn build(path: &Path) -> Result<Fingerprint, FingerprintError> {
    build_with_options(path, &BuildOptions::default())
}

/// Fingerprint `path` with explicit options.
pub fn build_with_options(
    path: &Path,
    opts: &BuildOptions,
) -> Result<Fingerprint, FingerprintError> {
    let layout = ChunkLayout::of_file(path, opts.chunk_size).map_err(|e| FingerprintError::Open {
        path: path.to_owned(),
        source: e,
    })?;
    let chunks = layout.chunk_count();
    let workers = opts
        .workers
        .unwrap_or_else(default_workers)
        .min(chunks.try_into().unwrap_or(usize::MAX))
        .max(1);

    if chunks < PARALLEL_THRESHOLD || workers == 1 {
        build_sequential(path, layout)
    } else {
        build_parallel(path, layout, workers)
    }
}

fn build_sequential(path: &Path, layout: ChunkLayout) -> Result<Fingerprint, FingerprintError> {
    debug!(
        "fingerprinting {} sequentially ({} chunks)",
        path.display(),
        layout.chunk_count()
    );
    let chunker = Chunker::open(path, layout.chunk_size()).map_err(|e| FingerprintError::Open {
        path: path.to_owned(),
        source: e,
    })?;

    let mut digests = Vec::with_capacity(layout.chunk_count() as usize);
    for item in chunker {
        let index = digests.len() as u64;
        let chunk = item.map_err(|e| FingerprintError::Read {
            path: path.to_owned(),
            index,
            offset: layout.offset_of(index),
            source: e,
        })?;
        digests.push(chunk_digest(&chunk.data));
    }
    Ok(Fingerprint::from_digests(layout.chunk_size(), digests))
}

fn build_parallel(
    path: &Path,
    layout: ChunkLayout,
    workers: usize,
) -> Result<Fingerprint, FingerprintError> {
    let chunks = layout.chunk_count();
    let per_worker = chunks.div_ceil(workers as u64);
    debug!(
        "fingerprinting {} in parallel ({} chunks, {} workers)",
        path.display(),
        chunks,
        workers
    );

    // One scoped thread per contiguous index range; each opens its own
    // read-only handle. Joining in spawn order keeps the digest ranges in
    // ascending index order.
    let results = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers as u64)
            .map_while(|w| {
                let start = w * per_worker;
                if start >= chunks {
                    return None;
                }
                let end = ((w + 1) * per_worker).min(chunks);
                Some(scope.spawn(move || digest_range(path, layout, start..end)))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });

    let mut digests = Vec::with_capacity(chunks as usize);
    for range_digests in results {
        digests.extend(range_digests?);
    }
    Ok(Fingerprint::from_digests(layout.chunk_size(), digests))
}

/// Digest a contiguous chunk range through a private file handle.
fn digest_range(
    path: &Path,
    layout: ChunkLayout,
    range: Range<u64>,
) -> Result<Vec<ChunkDigest>, FingerprintError> {
    let mut file = File::open(path).map_err(|e| FingerprintError::Open {
        path: path.to_owned(),
        source: e,
    })?;
    let mut buf = vec![0u8; layout.chunk_size() as usize];
    let mut digests = Vec::with_capacity((range.end - range.start) as usize);

    for index in range {
        let offset = layout.offset_of(index);
        let len = layout.len_of(index) as usize;
        let read_err = |source| FingerprintError::Read {
            path: path.to_owned(),
            index,
            offset,
            source,
        };
        file.seek(SeekFrom::Start(offset)).map_err(read_err)?;
        file.read_exact(&mut buf[..len]).map_err(read_err)?;
        digests.push(chunk_digest(&buf[..len]));
    }
    Ok(digests)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
