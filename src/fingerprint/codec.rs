// Fingerprint envelope (de)serialization.
//
// On disk a fingerprint is the bincode encoding of a keyed structure:
// the chunk size, then an ordered map of chunk index (u64) to 20-byte
// digest. Decoding a malformed or truncated envelope fails outright; a
// partial mapping is never returned.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::digest::ChunkDigest;
use crate::fingerprint::{Fingerprint, InvalidFingerprint};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while (de)serializing a fingerprint.
#[derive(Debug, Error)]
pub enum FingerprintCodecError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[error("cannot serialize fingerprint: {0}")]
    Encode(#[source] bincode::Error),
    #[error("malformed fingerprint envelope: {0}")]
    Decode(#[source] bincode::Error),
    #[error("invalid fingerprint envelope: {0}")]
    Invalid(#[from] InvalidFingerprint),
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Envelope {
    chunk_size: u64,
    digests: BTreeMap<u64, ChunkDigest>,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Serialize a fingerprint to its binary envelope.
pub fn encode(fingerprint: &Fingerprint) -> Result<Vec<u8>, FingerprintCodecError> {
    let envelope = Envelope {
        chunk_size: fingerprint.chunk_size(),
        digests: fingerprint.iter().map(|(i, d)| (i, *d)).collect(),
    };
    bincode::serialize(&envelope).map_err(FingerprintCodecError::Encode)
}

/// Deserialize a fingerprint, validating index contiguity.
pub fn decode(bytes: &[u8]) -> Result<Fingerprint, FingerprintCodecError> {
    let envelope: Envelope = bincode::deserialize(bytes).map_err(FingerprintCodecError::Decode)?;
    // BTreeMap iteration is ascending by key, so contiguity validation
    // catches any gap or out-of-range index.
    Ok(Fingerprint::from_entries(
        envelope.chunk_size,
        envelope.digests,
    )?)
}

/// Encode `fingerprint` and write it to `path`.
pub fn write_file(fingerprint: &Fingerprint, path: &Path) -> Result<(), FingerprintCodecError> {
    let bytes = encode(fingerprint)?;
    std::fs::write(path, bytes).map_err(|e| FingerprintCodecError::Io {
        path: path.to_owned(),
        source: e,
    })
}

/// Read and decode the fingerprint stored at `path`.
pub fn read_file(path: &Path) -> Result<Fingerprint, FingerprintCodecError> {
    let bytes = std::fs::read(path).map_err(|e| FingerprintCodecError::Io {
        path: path.to_owned(),
        source: e,
    })?;
    decode(&bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
