// Patch envelope: serialized entries behind zstd compression.
//
// The uncompressed layout is a keyed structure: chunk size (u64 LE), entry
// count (u64 LE), then per entry the chunk index (u64 LE), payload length
// (u64 LE), and the raw payload bytes.
// `PatchWriter`/`PatchReader` stream that layout entry-by-entry through the
// zstd encoder/decoder with bounded buffers, so a patch never has to fit in
// memory; `encode`/`decode` wrap them for whole-patch use. Both paths
// produce and accept identical bytes.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::patch::{InvalidPatch, Patch};

/// Default zstd compression level for patch envelopes.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 5;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while (de)serializing a patch envelope.
#[derive(Debug, Error)]
pub enum PatchCodecError {
    #[error("compression failed: {0}")]
    Compress(#[source] io::Error),
    #[error("decompression failed: {0}")]
    Decompress(#[source] io::Error),
    #[error("malformed patch envelope: {0}")]
    Malformed(String),
    #[error("invalid patch: {0}")]
    Invalid(#[from] InvalidPatch),
}

// ---------------------------------------------------------------------------
// Streaming writer
// ---------------------------------------------------------------------------

/// Streams patch entries through zstd to an underlying writer.
///
/// Entries must be written in ascending index order; the declared entry
/// count is enforced at `finish()`. The entry-length invariants (full
/// chunks everywhere, a shorter payload only on the last entry) are
/// enforced as entries arrive.
pub struct PatchWriter<W: Write> {
    encoder: zstd::stream::Encoder<'static, W>,
    chunk_size: u64,
    remaining: u64,
    prev_index: Option<u64>,
    prev_short: bool,
}

impl<W: Write> PatchWriter<W> {
    /// Start a patch envelope declaring `entry_count` entries.
    pub fn new(
        writer: W,
        chunk_size: u64,
        entry_count: u64,
        level: i32,
    ) -> Result<Self, PatchCodecError> {
        if chunk_size == 0 {
            return Err(InvalidPatch::ZeroChunkSize.into());
        }
        let mut encoder =
            zstd::stream::Encoder::new(writer, level).map_err(PatchCodecError::Compress)?;
        encoder
            .write_all(&chunk_size.to_le_bytes())
            .and_then(|()| encoder.write_all(&entry_count.to_le_bytes()))
            .map_err(PatchCodecError::Compress)?;
        Ok(Self {
            encoder,
            chunk_size,
            remaining: entry_count,
            prev_index: None,
            prev_short: false,
        })
    }

    /// Append one `(index, bytes)` entry.
    pub fn write_entry(&mut self, index: u64, bytes: &[u8]) -> Result<(), PatchCodecError> {
        if self.remaining == 0 {
            return Err(PatchCodecError::Malformed(format!(
                "entry for chunk {index} exceeds the declared entry count"
            )));
        }
        if let Some(prev) = self.prev_index
            && index <= prev
        {
            return Err(PatchCodecError::Malformed(format!(
                "entry for chunk {index} out of order (previous was {prev})"
            )));
        }
        let len = bytes.len() as u64;
        if len == 0 {
            return Err(InvalidPatch::EmptyEntry { index }.into());
        }
        if len > self.chunk_size {
            return Err(InvalidPatch::OversizedEntry {
                index,
                len,
                chunk_size: self.chunk_size,
            }
            .into());
        }
        if self.prev_short {
            // A short entry can only be the final one.
            let prev = self.prev_index.unwrap_or(0);
            return Err(PatchCodecError::Malformed(format!(
                "short entry for chunk {prev} must be final, but chunk {index} follows"
            )));
        }

        self.encoder
            .write_all(&index.to_le_bytes())
            .and_then(|()| self.encoder.write_all(&len.to_le_bytes()))
            .and_then(|()| self.encoder.write_all(bytes))
            .map_err(PatchCodecError::Compress)?;

        self.remaining -= 1;
        self.prev_index = Some(index);
        self.prev_short = len < self.chunk_size;
        Ok(())
    }

    /// Flush the zstd frame and return the underlying writer.
    pub fn finish(self) -> Result<W, PatchCodecError> {
        if self.remaining != 0 {
            return Err(PatchCodecError::Malformed(format!(
                "{} declared entries were never written",
                self.remaining
            )));
        }
        self.encoder.finish().map_err(PatchCodecError::Compress)
    }
}

// ---------------------------------------------------------------------------
// Streaming reader
// ---------------------------------------------------------------------------

/// Reads patch entries one at a time from a zstd-compressed envelope.
pub struct PatchReader<R: Read> {
    decoder: zstd::stream::Decoder<'static, io::BufReader<R>>,
    chunk_size: u64,
    remaining: u64,
    prev_index: Option<u64>,
}

impl<R: Read> PatchReader<R> {
    /// Open an envelope and read its header.
    pub fn new(reader: R) -> Result<Self, PatchCodecError> {
        let mut decoder =
            zstd::stream::Decoder::new(reader).map_err(PatchCodecError::Decompress)?;
        let chunk_size = read_u64_le(&mut decoder)?;
        let entry_count = read_u64_le(&mut decoder)?;
        if chunk_size == 0 {
            return Err(InvalidPatch::ZeroChunkSize.into());
        }
        Ok(Self {
            decoder,
            chunk_size,
            remaining: entry_count,
            prev_index: None,
        })
    }

    /// Chunk size declared by the envelope.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Entries not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read the next `(index, bytes)` entry; `None` after the last one.
    pub fn next_entry(&mut self) -> Result<Option<(u64, Vec<u8>)>, PatchCodecError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let index = read_u64_le(&mut self.decoder)?;
        let len = read_u64_le(&mut self.decoder)?;

        if let Some(prev) = self.prev_index
            && index <= prev
        {
            return Err(PatchCodecError::Malformed(format!(
                "entry for chunk {index} out of order (previous was {prev})"
            )));
        }
        if len == 0 {
            return Err(InvalidPatch::EmptyEntry { index }.into());
        }
        if len > self.chunk_size {
            return Err(InvalidPatch::OversizedEntry {
                index,
                len,
                chunk_size: self.chunk_size,
            }
            .into());
        }

        let mut bytes = vec![0u8; len as usize];
        self.decoder.read_exact(&mut bytes).map_err(|e| {
            PatchCodecError::Malformed(format!("truncated payload for chunk {index}: {e}"))
        })?;

        self.remaining -= 1;
        if len < self.chunk_size && self.remaining > 0 {
            return Err(InvalidPatch::ShortNonFinalEntry {
                index,
                len,
                chunk_size: self.chunk_size,
                last: index + self.remaining,
            }
            .into());
        }
        self.prev_index = Some(index);
        Ok(Some((index, bytes)))
    }
}

fn read_u64_le<R: Read>(reader: &mut R) -> Result<u64, PatchCodecError> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|e| PatchCodecError::Malformed(format!("truncated envelope header: {e}")))?;
    Ok(u64::from_le_bytes(buf))
}

// ---------------------------------------------------------------------------
// Whole-patch encode / decode
// ---------------------------------------------------------------------------

/// Serialize and compress a patch at the default level (5).
pub fn encode(patch: &Patch) -> Result<Vec<u8>, PatchCodecError> {
    encode_with_level(patch, DEFAULT_COMPRESSION_LEVEL)
}

/// Serialize and compress a patch at an explicit zstd level.
pub fn encode_with_level(patch: &Patch, level: i32) -> Result<Vec<u8>, PatchCodecError> {
    let mut writer = PatchWriter::new(Vec::new(), patch.chunk_size(), patch.len() as u64, level)?;
    for (index, bytes) in patch.iter() {
        writer.write_entry(index, bytes)?;
    }
    writer.finish()
}

/// Decompress and deserialize a patch, validating its invariants.
pub fn decode(bytes: &[u8]) -> Result<Patch, PatchCodecError> {
    let mut reader = PatchReader::new(bytes)?;
    let chunk_size = reader.chunk_size();
    let mut entries = Vec::with_capacity(reader.remaining().min(1024) as usize);
    while let Some(entry) = reader.next_entry()? {
        entries.push(entry);
    }
    Ok(Patch::from_entries(chunk_size, entries)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Patch {
        Patch::from_entries(4, vec![(0, vec![1; 4]), (2, vec![9; 4]), (5, vec![7; 2])]).unwrap()
    }

    #[test]
    fn roundtrip() {
        let patch = sample();
        let bytes = encode(&patch).unwrap();
        assert_eq!(decode(&bytes).unwrap(), patch);
    }

    #[test]
    fn roundtrip_empty_patch() {
        let patch = Patch::from_entries(4, Vec::new()).unwrap();
        let bytes = encode(&patch).unwrap();
        assert_eq!(decode(&bytes).unwrap(), patch);
    }

    #[test]
    fn roundtrip_single_entry() {
        let patch = Patch::from_entries(8, vec![(3, vec![5; 8])]).unwrap();
        let bytes = encode(&patch).unwrap();
        assert_eq!(decode(&bytes).unwrap(), patch);
    }

    #[test]
    fn streamed_bytes_match_whole_patch_encoding() {
        let patch = sample();
        let whole = encode(&patch).unwrap();

        let mut writer = PatchWriter::new(
            Vec::new(),
            patch.chunk_size(),
            patch.len() as u64,
            DEFAULT_COMPRESSION_LEVEL,
        )
        .unwrap();
        for (index, bytes) in patch.iter() {
            writer.write_entry(index, bytes).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), whole);
    }

    #[test]
    fn streaming_reader_yields_entries_in_order() {
        let bytes = encode(&sample()).unwrap();
        let mut reader = PatchReader::new(&bytes[..]).unwrap();
        assert_eq!(reader.chunk_size(), 4);
        assert_eq!(reader.remaining(), 3);
        assert_eq!(reader.next_entry().unwrap(), Some((0, vec![1; 4])));
        assert_eq!(reader.next_entry().unwrap(), Some((2, vec![9; 4])));
        assert_eq!(reader.next_entry().unwrap(), Some((5, vec![7; 2])));
        assert_eq!(reader.next_entry().unwrap(), None);
    }

    #[test]
    fn corrupted_envelope_fails() {
        let mut bytes = encode(&sample()).unwrap();
        let mid = bytes.len() / 2;
        bytes.truncate(mid);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn garbage_input_fails() {
        assert!(decode(b"not a zstd frame at all").is_err());
    }

    #[test]
    fn writer_rejects_out_of_order_entries() {
        let mut writer = PatchWriter::new(Vec::new(), 4, 2, DEFAULT_COMPRESSION_LEVEL).unwrap();
        writer.write_entry(5, &[1; 4]).unwrap();
        assert!(matches!(
            writer.write_entry(2, &[1; 4]),
            Err(PatchCodecError::Malformed(_))
        ));
    }

    #[test]
    fn writer_rejects_undercount_at_finish() {
        let mut writer = PatchWriter::new(Vec::new(), 4, 2, DEFAULT_COMPRESSION_LEVEL).unwrap();
        writer.write_entry(0, &[1; 4]).unwrap();
        assert!(matches!(
            writer.finish(),
            Err(PatchCodecError::Malformed(_))
        ));
    }

    #[test]
    fn writer_rejects_short_entry_followed_by_another() {
        let mut writer = PatchWriter::new(Vec::new(), 4, 2, DEFAULT_COMPRESSION_LEVEL).unwrap();
        writer.write_entry(0, &[1; 2]).unwrap();
        assert!(writer.write_entry(1, &[1; 4]).is_err());
    }

    #[test]
    fn compression_shrinks_redundant_payloads() {
        let patch = Patch::from_entries(4096, vec![(0, vec![0u8; 4096])]).unwrap();
        let bytes = encode(&patch).unwrap();
        assert!(bytes.len() < 4096 / 4, "compressed size {}", bytes.len());
    }
}
