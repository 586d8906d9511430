// Reconciliation driver: the operations an orchestration layer composes to
// bring a stale copy of a file up to date.
//
// The flow across two endpoints: fingerprint the stale copy and persist it;
// ship the fingerprint to the machine holding the current file; fingerprint
// that file, diff, and build a patch of the changed chunks; ship the patch
// back; apply it. Transport (ssh/scp or anything else) is the caller's
// business — everything here is local.
//
// An empty diff is a valid outcome, not an error: `make_patch` reports it
// as `PatchOutcome::Unchanged` so callers skip patch transfer entirely.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::fingerprint::build::{BuildOptions, FingerprintError};
use crate::fingerprint::codec::FingerprintCodecError;
use crate::fingerprint::diff::CompareError;
use crate::fingerprint::{self, Fingerprint};
use crate::patch::apply::ApplyError;
use crate::patch::build::PatchBuildError;
use crate::patch::codec::{self, PatchCodecError, PatchReader};
use crate::patch::{self, Patch};

/// Suffix for persisted fingerprints (`disk.img` → `disk.img.fingerprint`).
pub const FINGERPRINT_SUFFIX: &str = ".fingerprint";
/// Suffix for persisted patches (`disk.img` → `disk.img.blockpatch`).
pub const PATCH_SUFFIX: &str = ".blockpatch";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Any reconciliation failure, wrapped so the failing stage is always
/// identifiable.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("fingerprinting failed: {0}")]
    Fingerprint(#[from] FingerprintError),
    #[error("fingerprint codec failed: {0}")]
    FingerprintCodec(#[from] FingerprintCodecError),
    #[error("diff failed: {0}")]
    Compare(#[from] CompareError),
    #[error("patch build failed: {0}")]
    PatchBuild(#[from] PatchBuildError),
    #[error("patch codec failed: {0}")]
    PatchCodec(#[from] PatchCodecError),
    #[error("patch apply failed: {0}")]
    Apply(#[from] ApplyError),
    #[error("I/O error on {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> EngineError + '_ {
    move |source| EngineError::Io {
        path: path.to_owned(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of diffing a file against a stale fingerprint: either the file
/// is unchanged, or a patch carrying the changed chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Unchanged,
    Changed(Patch),
}

// ---------------------------------------------------------------------------
// Default artifact paths
// ---------------------------------------------------------------------------

/// `<file>.fingerprint` beside the file.
pub fn fingerprint_path_for(file: &Path) -> PathBuf {
    suffixed(file, FINGERPRINT_SUFFIX)
}

/// `<file>.blockpatch` beside the file.
pub fn patch_path_for(file: &Path) -> PathBuf {
    suffixed(file, PATCH_SUFFIX)
}

fn suffixed(file: &Path, suffix: &str) -> PathBuf {
    let mut name = file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    file.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Fingerprint operations
// ---------------------------------------------------------------------------

/// Fingerprint `file` and persist the envelope at `out`.
pub fn build_and_save_fingerprint(file: &Path, out: &Path) -> Result<Fingerprint, EngineError> {
    build_and_save_fingerprint_with(file, out, &BuildOptions::default())
}

/// Fingerprint `file` with explicit options and persist the envelope.
pub fn build_and_save_fingerprint_with(
    file: &Path,
    out: &Path,
    opts: &BuildOptions,
) -> Result<Fingerprint, EngineError> {
    let fp = fingerprint::build_with_options(file, opts)?;
    fingerprint::codec::write_file(&fp, out)?;
    info!(
        "saved fingerprint of {} ({} chunks) to {}",
        file.display(),
        fp.chunk_count(),
        out.display()
    );
    Ok(fp)
}

/// Load a persisted fingerprint.
pub fn load_fingerprint(path: &Path) -> Result<Fingerprint, EngineError> {
    Ok(fingerprint::codec::read_file(path)?)
}

/// Ascending indices of chunks that differ between two fingerprints.
///
/// Fails with a size mismatch when the chunk counts (or chunk sizes)
/// differ; the caller must fall back to a full transfer.
pub fn diff(old: &Fingerprint, new: &Fingerprint) -> Result<Vec<u64>, EngineError> {
    Ok(fingerprint::diff::compare(old, new)?)
}

// ---------------------------------------------------------------------------
// Patch operations
// ---------------------------------------------------------------------------

/// Read the chunks named by `indices` out of `file` into a patch.
pub fn build_patch(file: &Path, chunk_size: u64, indices: &[u64]) -> Result<Patch, EngineError> {
    Ok(patch::build::build(file, chunk_size, indices)?)
}

/// Encode, compress (default level), and persist a patch.
pub fn save_patch(patch: &Patch, path: &Path) -> Result<(), EngineError> {
    let bytes = codec::encode(patch)?;
    std::fs::write(path, &bytes).map_err(io_err(path))?;
    info!(
        "saved patch ({} chunks, {} bytes compressed) to {}",
        patch.len(),
        bytes.len(),
        path.display()
    );
    Ok(())
}

/// Load and decode a persisted patch.
pub fn load_patch(path: &Path) -> Result<Patch, EngineError> {
    let bytes = std::fs::read(path).map_err(io_err(path))?;
    Ok(codec::decode(&bytes)?)
}

/// Apply a decoded patch to `file` atomically (shadow copy + rename).
pub fn apply_patch(file: &Path, patch: &Patch) -> Result<(), EngineError> {
    patch::apply::apply(file, patch)?;
    info!("applied {} chunks to {}", patch.len(), file.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Convenience flows
// ---------------------------------------------------------------------------

/// Diff `file` against the stale fingerprint at `fingerprint_path` and
/// build a patch of the changed chunks, or report that nothing changed.
pub fn make_patch(file: &Path, fingerprint_path: &Path) -> Result<PatchOutcome, EngineError> {
    let old = load_fingerprint(fingerprint_path)?;
    let current = fingerprint::build_with_options(
        file,
        &BuildOptions {
            chunk_size: old.chunk_size(),
            workers: None,
        },
    )?;
    let changed = diff(&old, &current)?;
    if changed.is_empty() {
        debug!("{} is unchanged since its fingerprint", file.display());
        return Ok(PatchOutcome::Unchanged);
    }
    let patch = build_patch(file, old.chunk_size(), &changed)?;
    Ok(PatchOutcome::Changed(patch))
}

/// Streaming variant of `make_patch` + `save_patch`: changed chunks go
/// straight from `file` through the compressor into `out`, one chunk in
/// memory at a time. Returns the changed indices, empty when unchanged (in
/// which case `out` is not created).
pub fn make_patch_file(
    file: &Path,
    fingerprint_path: &Path,
    out: &Path,
    level: i32,
) -> Result<Vec<u64>, EngineError> {
    let old = load_fingerprint(fingerprint_path)?;
    let current = fingerprint::build_with_options(
        file,
        &BuildOptions {
            chunk_size: old.chunk_size(),
            workers: None,
        },
    )?;
    let changed = diff(&old, &current)?;
    if changed.is_empty() {
        debug!("{} is unchanged since its fingerprint", file.display());
        return Ok(changed);
    }
    let writer = std::fs::File::create(out).map_err(io_err(out))?;
    patch::build::build_to(file, old.chunk_size(), &changed, writer, level)?;
    info!(
        "saved patch ({} chunks) of {} to {}",
        changed.len(),
        file.display(),
        out.display()
    );
    Ok(changed)
}

/// Streaming variant of `load_patch` + `apply_patch`: decode the envelope
/// at `patch_path` entry-by-entry onto `file`, atomically unless
/// `in_place`.
pub fn apply_patch_file(file: &Path, patch_path: &Path, in_place: bool) -> Result<(), EngineError> {
    let input = std::fs::File::open(patch_path).map_err(io_err(patch_path))?;
    let reader = PatchReader::new(input)?;
    if in_place {
        patch::apply::apply_in_place_from(file, reader)?;
    } else {
        patch::apply::apply_from(file, reader)?;
    }
    info!("applied {} to {}", patch_path.display(), file.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::codec::DEFAULT_COMPRESSION_LEVEL;
    use std::io::Write;

    fn temp_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    fn opts(chunk_size: u64) -> BuildOptions {
        BuildOptions {
            chunk_size,
            workers: Some(1),
        }
    }

    #[test]
    fn fingerprint_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(dir.path(), "data.bin", b"aaaabbbbcc");
        let fp_path = fingerprint_path_for(&file);
        let built = build_and_save_fingerprint_with(&file, &fp_path, &opts(4)).unwrap();
        assert_eq!(load_fingerprint(&fp_path).unwrap(), built);
    }

    #[test]
    fn make_patch_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(dir.path(), "data.bin", b"aaaabbbb");
        let fp_path = fingerprint_path_for(&file);
        build_and_save_fingerprint_with(&file, &fp_path, &opts(4)).unwrap();
        assert_eq!(make_patch(&file, &fp_path).unwrap(), PatchOutcome::Unchanged);
    }

    #[test]
    fn end_to_end_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let stale = temp_file(dir.path(), "stale.bin", b"aaaabbbbccccdd");
        let current = temp_file(dir.path(), "current.bin", b"aaaaBBBBccccDD");

        let fp_path = fingerprint_path_for(&stale);
        build_and_save_fingerprint_with(&stale, &fp_path, &opts(4)).unwrap();

        let patch = match make_patch(&current, &fp_path).unwrap() {
            PatchOutcome::Changed(p) => p,
            PatchOutcome::Unchanged => panic!("expected changes"),
        };
        assert_eq!(patch.indices().collect::<Vec<_>>(), vec![1, 3]);

        let patch_path = patch_path_for(&current);
        save_patch(&patch, &patch_path).unwrap();
        let loaded = load_patch(&patch_path).unwrap();
        assert_eq!(loaded, patch);

        apply_patch(&stale, &loaded).unwrap();
        assert_eq!(
            std::fs::read(&stale).unwrap(),
            std::fs::read(&current).unwrap()
        );
    }

    #[test]
    fn streaming_flow_matches_in_memory_flow() {
        let dir = tempfile::tempdir().unwrap();
        let stale = temp_file(dir.path(), "stale.bin", b"aaaabbbbcccc");
        let current = temp_file(dir.path(), "current.bin", b"aaaabbXbcccc");

        let fp_path = fingerprint_path_for(&stale);
        build_and_save_fingerprint_with(&stale, &fp_path, &opts(4)).unwrap();

        let patch_path = dir.path().join("streamed.blockpatch");
        let changed =
            make_patch_file(&current, &fp_path, &patch_path, DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert_eq!(changed, vec![1]);

        apply_patch_file(&stale, &patch_path, false).unwrap();
        assert_eq!(
            std::fs::read(&stale).unwrap(),
            std::fs::read(&current).unwrap()
        );
    }

    #[test]
    fn size_change_surfaces_as_compare_error() {
        let dir = tempfile::tempdir().unwrap();
        let old_file = temp_file(dir.path(), "old.bin", &[1u8; 8]); // 2 chunks
        let new_file = temp_file(dir.path(), "new.bin", &[1u8; 4]); // 1 chunk
        let fp_path = fingerprint_path_for(&old_file);
        build_and_save_fingerprint_with(&old_file, &fp_path, &opts(4)).unwrap();

        let err = make_patch(&new_file, &fp_path).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Compare(CompareError::ChunkCountMismatch { old: 2, new: 1 })
        ));
    }

    #[test]
    fn artifact_paths_carry_suffixes() {
        assert_eq!(
            fingerprint_path_for(Path::new("/x/disk.img")),
            Path::new("/x/disk.img.fingerprint")
        );
        assert_eq!(
            patch_path_for(Path::new("/x/disk.img")),
            Path::new("/x/disk.img.blockpatch")
        );
    }
}
