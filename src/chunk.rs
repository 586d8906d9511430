// Fixed-size chunk addressing and lazy chunk iteration.
//
// A file of size S with chunk size C is covered by `ceil(S / C)` chunks,
// indexed from 0. Every chunk spans exactly C bytes except the last, which
// holds the trailing remainder. `ChunkLayout` is the pure math; `Chunker`
// walks a file's chunks front to back without loading the file into memory.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

// ---------------------------------------------------------------------------
// ChunkLayout
// ---------------------------------------------------------------------------

/// Chunk geometry of a file: its size and the configured chunk size.
///
/// All offset/length math for fingerprinting, patch building, and patch
/// application goes through here so the final-chunk remainder is handled in
/// one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkLayout {
    /// Create a layout. `chunk_size` must be non-zero.
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            file_size,
            chunk_size,
        }
    }

    /// Layout of an existing file, taking its current size from the filesystem.
    pub fn of_file(path: &Path, chunk_size: u64) -> io::Result<Self> {
        let file_size = std::fs::metadata(path)?.len();
        Ok(Self::new(file_size, chunk_size))
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks covering the file (`ceil(S / C)`). Zero for an
    /// empty file.
    pub fn chunk_count(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size)
    }

    /// Whether `index` addresses a chunk of this file.
    pub fn contains(&self, index: u64) -> bool {
        index < self.chunk_count()
    }

    /// Byte offset where chunk `index` starts.
    pub fn offset_of(&self, index: u64) -> u64 {
        index * self.chunk_size
    }

    /// Byte length of chunk `index`: the chunk size, or the trailing
    /// remainder for the final chunk.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; callers validate indices first.
    pub fn len_of(&self, index: u64) -> u64 {
        assert!(self.contains(index), "chunk index {index} out of range");
        let offset = self.offset_of(index);
        (self.file_size - offset).min(self.chunk_size)
    }
}

// ---------------------------------------------------------------------------
// Chunker
// ---------------------------------------------------------------------------

/// One chunk read from a file: its index and its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u64,
    pub data: Vec<u8>,
}

/// Lazy iterator over a file's chunks in ascending index order.
///
/// Yields `io::Result<Chunk>`; a read failure mid-sequence surfaces as an
/// `Err` item and ends the iteration. Re-open the file (a fresh `Chunker`)
/// to restart from chunk 0.
pub struct Chunker {
    reader: BufReader<File>,
    chunk_size: usize,
    next_index: u64,
    done: bool,
}

impl Chunker {
    /// Open `path` for chunked reading.
    pub fn open(path: &Path, chunk_size: u64) -> io::Result<Self> {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            chunk_size: chunk_size as usize,
            next_index: 0,
            done: false,
        })
    }

    fn read_chunk(&mut self) -> io::Result<Option<Chunk>> {
        let mut data = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            match self.reader.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        data.truncate(filled);
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Chunk { index, data }))
    }
}

impl Iterator for Chunker {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(data: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(data).unwrap();
        f
    }

    #[test]
    fn layout_math() {
        let layout = ChunkLayout::new(10, 4);
        assert_eq!(layout.chunk_count(), 3);
        assert_eq!(layout.offset_of(0), 0);
        assert_eq!(layout.offset_of(2), 8);
        assert_eq!(layout.len_of(0), 4);
        assert_eq!(layout.len_of(1), 4);
        assert_eq!(layout.len_of(2), 2);
        assert!(layout.contains(2));
        assert!(!layout.contains(3));
    }

    #[test]
    fn layout_exact_multiple() {
        let layout = ChunkLayout::new(8, 4);
        assert_eq!(layout.chunk_count(), 2);
        assert_eq!(layout.len_of(1), 4);
    }

    #[test]
    fn layout_empty_file() {
        let layout = ChunkLayout::new(0, 4);
        assert_eq!(layout.chunk_count(), 0);
        assert!(!layout.contains(0));
    }

    #[test]
    fn layout_single_short_chunk() {
        let layout = ChunkLayout::new(3, 4);
        assert_eq!(layout.chunk_count(), 1);
        assert_eq!(layout.len_of(0), 3);
    }

    #[test]
    fn chunks_reconstruct_file() {
        let data: Vec<u8> = (0..100u8).collect();
        let f = temp_file(&data);

        let chunks: Vec<Chunk> = Chunker::open(f.path(), 7)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();

        assert_eq!(chunks.len(), 100usize.div_ceil(7));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as u64);
        }
        let rebuilt: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let f = temp_file(b"");
        let mut chunker = Chunker::open(f.path(), 4).unwrap();
        assert!(chunker.next().is_none());
    }

    #[test]
    fn final_chunk_is_shortened() {
        let f = temp_file(b"abcdefghij"); // 10 bytes, chunk size 4
        let chunks: Vec<Chunk> = Chunker::open(f.path(), 4)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data, b"abcd");
        assert_eq!(chunks[1].data, b"efgh");
        assert_eq!(chunks[2].data, b"ij");
    }

    #[test]
    fn missing_file_fails_to_open() {
        assert!(Chunker::open(Path::new("/nonexistent/blocksync-test"), 4).is_err());
    }
}
