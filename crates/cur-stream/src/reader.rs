//! Byte sources, UTF-8 decoding and input discovery.
//!
//! Sources are pulled strictly in order. Each pull is bounded; a multi-byte
//! UTF-8 sequence split across two pulls is carried over and completed by the
//! next one.

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use cur_core::error::{IngestError, Result};
use tracing::{debug, warn};

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.csv` files recursively under `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Input path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Expand directories into the CSV files below them. Other paths are kept
/// as given so that a missing file surfaces as a read error later.
pub fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = find_csv_files(input);
            debug!("{} CSV files under {}", found.len(), input.display());
            out.extend(found);
        } else {
            out.push(input.clone());
        }
    }
    out
}

/// Split an oversized decoded chunk into pieces of about `piece_bytes`,
/// cutting only on char boundaries. Chunks up to `threshold` bytes are
/// returned whole.
pub fn split_large_chunk(text: &str, threshold: usize, piece_bytes: usize) -> Vec<&str> {
    if text.len() <= threshold || piece_bytes == 0 {
        return vec![text];
    }

    let mut pieces = Vec::with_capacity(text.len() / piece_bytes + 1);
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + piece_bytes).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}

// ── ChunkDecoder ──────────────────────────────────────────────────────────────

/// Incremental UTF-8 decoder.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
    /// Bytes already emitted as text.
    offset: u64,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, holding back an incomplete trailing sequence.
    ///
    /// Invalid UTF-8 is fatal and reported with its absolute byte offset.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String> {
        let mut data = std::mem::take(&mut self.carry);
        data.extend_from_slice(bytes);

        let valid = match std::str::from_utf8(&data) {
            Ok(_) => data.len(),
            Err(e) if e.error_len().is_some() => {
                return Err(IngestError::decode(format!(
                    "invalid UTF-8 at byte offset {}",
                    self.offset + e.valid_up_to() as u64
                )));
            }
            Err(e) => e.valid_up_to(),
        };

        self.carry = data.split_off(valid);
        self.offset += valid as u64;
        String::from_utf8(data).map_err(|e| IngestError::decode(e.to_string()))
    }

    /// Fail if the input ended in the middle of a multi-byte sequence.
    pub fn finish(&self) -> Result<()> {
        if self.carry.is_empty() {
            Ok(())
        } else {
            Err(IngestError::decode(format!(
                "input ends inside a multi-byte UTF-8 sequence at byte offset {}",
                self.offset
            )))
        }
    }
}

// ── ChunkReader ───────────────────────────────────────────────────────────────

/// Pulls bounded, decoded text chunks from any [`Read`] source.
pub struct ChunkReader<R> {
    reader: R,
    decoder: ChunkDecoder,
    buf: Vec<u8>,
    bytes_read: u64,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: R, chunk_bytes: usize) -> Self {
        Self {
            reader,
            decoder: ChunkDecoder::new(),
            buf: vec![0; chunk_bytes.max(1)],
            bytes_read: 0,
            done: false,
        }
    }

    /// Raw bytes pulled from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// The next non-empty decoded chunk, or `None` at end of input.
    pub fn next_chunk(&mut self) -> Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        loop {
            match self.reader.read(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    self.decoder.finish()?;
                    return Ok(None);
                }
                Ok(n) => {
                    self.bytes_read += n as u64;
                    let text = self.decoder.decode(&self.buf[..n])?;
                    if !text.is_empty() {
                        return Ok(Some(text));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(IngestError::source_read(
                        format!("read failed after {} bytes", self.bytes_read),
                        e,
                    ));
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
