//! Blocksync: fixed-block fingerprint/diff/patch engine for large files.
//!
//! Detects which fixed-size chunks of a file (a disk image, typically)
//! changed relative to a previously recorded fingerprint, and builds a
//! compact compressed patch carrying only those chunks, so two copies of a
//! multi-gigabyte file can be reconciled without transferring the whole
//! thing. Chunks are position-aligned: a size change invalidates the whole
//! comparison and callers fall back to a full transfer.
//!
//! The crate provides:
//! - Chunk addressing and iteration (`chunk`)
//! - Per-chunk SHA-1 digests (`digest`)
//! - Fingerprint building, persistence, and diffing (`fingerprint`)
//! - Patch building, codec, and application (`patch`)
//! - The high-level reconciliation operations (`engine`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use blocksync::engine::{self, PatchOutcome};
//!
//! let stale = Path::new("copy/disk.img");
//! let current = Path::new("master/disk.img");
//! let fp = Path::new("copy/disk.img.fingerprint");
//!
//! // On the machine holding the stale copy:
//! engine::build_and_save_fingerprint(stale, fp)?;
//!
//! // On the machine holding the current file (after shipping `fp` over):
//! if let PatchOutcome::Changed(patch) = engine::make_patch(current, fp)? {
//!     // Ship the patch back, then on the stale side:
//!     engine::apply_patch(stale, &patch)?;
//! }
//! # Ok::<(), blocksync::engine::EngineError>(())
//! ```

pub mod chunk;
pub mod digest;
pub mod engine;
pub mod fingerprint;
pub mod patch;

#[cfg(feature = "cli")]
pub mod cli;
