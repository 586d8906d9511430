// Patch application: overwrite the target's changed chunks.
//
// The target must have the same size and chunk layout as the file the patch
// was derived from; application never grows or truncates it. The default
// path is atomic: the target is copied to a shadow sibling, the shadow is
// patched and fsynced, and the shadow is renamed over the target, so a
// crash mid-apply leaves the original intact. `apply_in_place` writes
// directly into the target for callers that cannot afford the copy and
// accept the partial-apply window.
//
// The caller guarantees sole write access to the target for the duration.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::chunk::ChunkLayout;
use crate::patch::Patch;
use crate::patch::codec::{PatchCodecError, PatchReader};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while applying a patch to a target file.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: io::Error,
    },
    #[error("write failed at chunk {index} (offset {offset}) of {}: {source}", path.display())]
    Write {
        path: PathBuf,
        index: u64,
        offset: u64,
        source: io::Error,
    },
    #[error("patch chunk {index} is out of range: {} has only {chunks} chunks", path.display())]
    OutOfRange {
        path: PathBuf,
        index: u64,
        chunks: u64,
    },
    #[error(
        "patch entry for chunk {index} is {actual} bytes but {} expects {expected} \
         (applying would resize the file)",
        path.display()
    )]
    LengthMismatch {
        path: PathBuf,
        index: u64,
        expected: u64,
        actual: u64,
    },
    #[error("flush failed for {}: {source}", path.display())]
    Flush {
        path: PathBuf,
        source: io::Error,
    },
    #[error("shadow copy {}: {source}", path.display())]
    Shadow {
        path: PathBuf,
        source: io::Error,
    },
    #[error(transparent)]
    Codec(#[from] PatchCodecError),
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Apply `patch` to `target` atomically via a shadow copy.
pub fn apply(target: &Path, patch: &Patch) -> Result<(), ApplyError> {
    run_apply(target, patch.chunk_size(), true, |sink| {
        for (index, bytes) in patch.iter() {
            sink(index, bytes)?;
        }
        Ok(())
    })
}

/// Apply `patch` directly into `target`. A failure partway leaves the
/// target partially patched.
pub fn apply_in_place(target: &Path, patch: &Patch) -> Result<(), ApplyError> {
    run_apply(target, patch.chunk_size(), false, |sink| {
        for (index, bytes) in patch.iter() {
            sink(index, bytes)?;
        }
        Ok(())
    })
}

/// Stream a patch envelope onto `target` atomically, one chunk in memory at
/// a time.
pub fn apply_from<R: std::io::Read>(
    target: &Path,
    mut reader: PatchReader<R>,
) -> Result<(), ApplyError> {
    let chunk_size = reader.chunk_size();
    run_apply(target, chunk_size, true, |sink| {
        while let Some((index, bytes)) = reader.next_entry()? {
            sink(index, &bytes)?;
        }
        Ok(())
    })
}

/// Stream a patch envelope directly into `target` (non-atomic).
pub fn apply_in_place_from<R: std::io::Read>(
    target: &Path,
    mut reader: PatchReader<R>,
) -> Result<(), ApplyError> {
    let chunk_size = reader.chunk_size();
    run_apply(target, chunk_size, false, |sink| {
        while let Some((index, bytes)) = reader.next_entry()? {
            sink(index, &bytes)?;
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Core write loop
// ---------------------------------------------------------------------------

type EntrySink<'a> = dyn FnMut(u64, &[u8]) -> Result<(), ApplyError> + 'a;

fn run_apply(
    target: &Path,
    chunk_size: u64,
    atomic: bool,
    feed: impl FnOnce(&mut EntrySink<'_>) -> Result<(), ApplyError>,
) -> Result<(), ApplyError> {
    let layout = ChunkLayout::of_file(target, chunk_size).map_err(|e| ApplyError::Open {
        path: target.to_owned(),
        source: e,
    })?;

    if !atomic {
        let mut file = open_rw(target)?;
        feed(&mut |index, bytes| write_chunk(&mut file, target, layout, index, bytes))?;
        return file.sync_all().map_err(|e| ApplyError::Flush {
            path: target.to_owned(),
            source: e,
        });
    }

    let shadow = shadow_path(target);
    debug!(
        "applying patch to {} via shadow {}",
        target.display(),
        shadow.display()
    );
    fs::copy(target, &shadow).map_err(|e| ApplyError::Shadow {
        path: shadow.clone(),
        source: e,
    })?;

    let patched = (|| {
        let mut file = open_rw(&shadow)?;
        feed(&mut |index, bytes| write_chunk(&mut file, target, layout, index, bytes))?;
        file.sync_all().map_err(|e| ApplyError::Flush {
            path: shadow.clone(),
            source: e,
        })
    })();

    match patched {
        Ok(()) => fs::rename(&shadow, target).map_err(|e| {
            let _ = fs::remove_file(&shadow);
            ApplyError::Shadow {
                path: shadow.clone(),
                source: e,
            }
        }),
        Err(e) => {
            let _ = fs::remove_file(&shadow);
            Err(e)
        }
    }
}

fn open_rw(path: &Path) -> Result<File, ApplyError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| ApplyError::Open {
            path: path.to_owned(),
            source: e,
        })
}

fn write_chunk(
    file: &mut File,
    target: &Path,
    layout: ChunkLayout,
    index: u64,
    bytes: &[u8],
) -> Result<(), ApplyError> {
    if !layout.contains(index) {
        return Err(ApplyError::OutOfRange {
            path: target.to_owned(),
            index,
            chunks: layout.chunk_count(),
        });
    }
    let expected = layout.len_of(index);
    if bytes.len() as u64 != expected {
        return Err(ApplyError::LengthMismatch {
            path: target.to_owned(),
            index,
            expected,
            actual: bytes.len() as u64,
        });
    }
    let offset = layout.offset_of(index);
    let write_err = |source| ApplyError::Write {
        path: target.to_owned(),
        index,
        offset,
        source,
    };
    file.seek(SeekFrom::Start(offset)).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)
}

/// Shadow sibling of `target`: same directory, `.patching` suffix, so the
/// final rename stays on one filesystem.
fn shadow_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "target".into());
    name.push(".patching");
    target.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
