//! Async parse driver.
//!
//! Same pipeline as the blocking drivers in `cur_stream::ingest`, but pulls
//! from a [`tokio::io::AsyncRead`] and suspends with
//! [`tokio::task::yield_now`] after every batch so a large export never
//! monopolises a runtime worker.

use cur_core::error::{IngestError, Result};
use cur_core::models::{ParseOutput, ParseProgress};
use cur_core::normalize::CodeNormalizer;
use cur_core::settings::EngineConfig;
use cur_stream::parser::StreamingParser;
use cur_stream::reader::{split_large_chunk, ChunkDecoder};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse an async byte source.
///
/// When `config` carries a timeout the whole parse runs under
/// [`tokio::time::timeout`] and fails with [`IngestError::Timeout`]; the
/// partial result is dropped.
pub async fn parse_async<R>(
    reader: R,
    total_bytes: Option<u64>,
    config: &EngineConfig,
    normalizer: CodeNormalizer,
    on_progress: impl FnMut(ParseProgress),
) -> Result<ParseOutput>
where
    R: AsyncRead + Unpin,
{
    let parse = drive(reader, total_bytes, config, normalizer, on_progress);
    match config.timeout() {
        Some(limit) => tokio::time::timeout(limit, parse)
            .await
            .map_err(|_| IngestError::Timeout { limit })?,
        None => parse.await,
    }
}

async fn drive<R>(
    mut reader: R,
    total_bytes: Option<u64>,
    config: &EngineConfig,
    normalizer: CodeNormalizer,
    mut on_progress: impl FnMut(ParseProgress),
) -> Result<ParseOutput>
where
    R: AsyncRead + Unpin,
{
    let mut parser = StreamingParser::new(config, normalizer)?;
    let mut decoder = ChunkDecoder::new();
    let mut buf = vec![0u8; config.read_chunk_bytes];
    let mut bytes_read: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await.map_err(|e| {
            IngestError::source_read(format!("read failed after {bytes_read} bytes"), e)
        })?;
        if n == 0 {
            break;
        }
        bytes_read += n as u64;

        let text = decoder.decode(&buf[..n])?;
        for piece in split_large_chunk(&text, config.large_chunk_bytes, config.sub_chunk_bytes) {
            parser.push_text(piece)?;
            drain(&mut parser).await?;
        }
        if let Some(total) = total_bytes {
            on_progress(ParseProgress::new(bytes_read, total, parser.lines_processed()));
        }
    }

    decoder.finish()?;
    parser.end_input();
    drain(&mut parser).await?;
    parser.finish()
}

async fn drain(parser: &mut StreamingParser) -> Result<()> {
    while parser.has_ready_lines() {
        parser.process_batch()?;
        tokio::task::yield_now().await;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "service,resource_id,region,cost\n\
                         EC2,i-1,us-east-1,10.00\n\
                         EC2,i-1,us-east-1,5.50\n\
                         TAX,,,3.00\n\
                         S3,bucket,us-east-1,1.25\n";

    fn config() -> EngineConfig {
        EngineConfig {
            batch_lines: 1,
            read_chunk_bytes: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_parse_async_matches_blocking() {
        let asynchronous = parse_async(
            INPUT.as_bytes(),
            None,
            &config(),
            CodeNormalizer::new(8),
            |_| {},
        )
        .await
        .unwrap();
        let blocking = cur_stream::parse_bytes(
            INPUT.as_bytes(),
            &EngineConfig::default(),
            CodeNormalizer::new(8),
            |_| {},
        )
        .unwrap();
        assert_eq!(asynchronous, blocking);
        assert_eq!(asynchronous.workloads[0].monthly_cost, 15.5);
        assert_eq!(asynchronous.metadata.skipped_rows.tax, 1);
    }

    #[tokio::test]
    async fn test_parse_async_reports_progress() {
        let mut last = None;
        parse_async(
            INPUT.as_bytes(),
            Some(INPUT.len() as u64),
            &config(),
            CodeNormalizer::new(8),
            |p| last = Some(p),
        )
        .await
        .unwrap();
        let last = last.unwrap();
        assert_eq!(last.percent, 100.0);
        assert_eq!(last.lines_processed, 5);
    }

    #[tokio::test]
    async fn test_parse_async_header_only() {
        let err = parse_async(
            &b"service,cost\n"[..],
            None,
            &config(),
            CodeNormalizer::new(8),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IngestError::EmptyData));
    }

    #[tokio::test]
    async fn test_parse_async_times_out_on_stalled_source() {
        // The writer half stays alive and silent, so reads never complete.
        let (_writer, reader) = tokio::io::duplex(64);
        let cfg = EngineConfig {
            timeout_secs: Some(1),
            ..Default::default()
        };
        let err = parse_async(reader, None, &cfg, CodeNormalizer::new(8), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Timeout { .. }));
    }
}
