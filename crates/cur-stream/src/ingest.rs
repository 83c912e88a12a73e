//! Blocking drivers: pull chunks from a source and run the parser to
//! completion on the current thread.
//!
//! Between batches the thread yields; at chunk boundaries progress is
//! reported when the total size is known. On any failure the partial state is
//! dropped and only the error is returned.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use cur_core::error::{IngestError, Result};
use cur_core::models::{ParseOutput, ParseProgress};
use cur_core::normalize::CodeNormalizer;
use cur_core::settings::EngineConfig;
use tracing::debug;

use crate::parser::StreamingParser;
use crate::reader::{split_large_chunk, ChunkReader};
use crate::scheduler::{drain_ready, Deadline};

/// Parse a streamed source of `read_chunk_bytes` pulls.
///
/// `total_bytes` only drives progress reporting; pass `None` when unknown.
pub fn parse_reader<R: Read>(
    reader: R,
    total_bytes: Option<u64>,
    config: &EngineConfig,
    normalizer: CodeNormalizer,
    on_progress: impl FnMut(ParseProgress),
) -> Result<ParseOutput> {
    run(
        ChunkReader::new(reader, config.read_chunk_bytes),
        total_bytes,
        config,
        normalizer,
        on_progress,
    )
}

/// Parse an in-memory buffer in slices of at most `buffer_chunk_bytes`.
pub fn parse_bytes(
    bytes: &[u8],
    config: &EngineConfig,
    normalizer: CodeNormalizer,
    on_progress: impl FnMut(ParseProgress),
) -> Result<ParseOutput> {
    run(
        ChunkReader::new(bytes, config.buffer_chunk_bytes),
        Some(bytes.len() as u64),
        config,
        normalizer,
        on_progress,
    )
}

/// Parse a file, reporting progress against its length.
pub fn parse_file(
    path: &Path,
    config: &EngineConfig,
    normalizer: CodeNormalizer,
    on_progress: impl FnMut(ParseProgress),
) -> Result<ParseOutput> {
    let file = File::open(path)
        .map_err(|e| IngestError::source_read(format!("cannot open {}", path.display()), e))?;
    let total = file.metadata().ok().map(|m| m.len());
    debug!("Parsing {} ({:?} bytes)", path.display(), total);
    parse_reader(file, total, config, normalizer, on_progress)
}

fn run<R: Read>(
    mut chunks: ChunkReader<R>,
    total_bytes: Option<u64>,
    config: &EngineConfig,
    normalizer: CodeNormalizer,
    mut on_progress: impl FnMut(ParseProgress),
) -> Result<ParseOutput> {
    let deadline = Deadline::start(config.timeout());
    let mut parser = StreamingParser::new(config, normalizer)?;

    while let Some(text) = chunks.next_chunk()? {
        for piece in split_large_chunk(&text, config.large_chunk_bytes, config.sub_chunk_bytes) {
            parser.push_text(piece)?;
            drain_ready(&mut parser, &deadline, std::thread::yield_now)?;
        }
        if let Some(total) = total_bytes {
            on_progress(ParseProgress::new(
                chunks.bytes_read(),
                total,
                parser.lines_processed(),
            ));
        }
    }

    parser.end_input();
    drain_ready(&mut parser, &deadline, std::thread::yield_now)?;
    deadline.check()?;
    let output = parser.finish()?;
    debug!(elapsed = ?deadline.elapsed(), "source drained");
    Ok(output)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
