//! Background ingestion orchestrator.
//!
//! Runs one parse in a dedicated tokio task and forwards [`ParseProgress`]
//! snapshots through an `mpsc` channel, so a caller can render progress
//! without sharing any mutable state with the parse.

use std::path::PathBuf;

use anyhow::anyhow;
use cur_core::error::{IngestError, Result};
use cur_core::models::{ParseOutput, ParseProgress};
use cur_core::normalize::CodeNormalizer;
use cur_core::settings::EngineConfig;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::driver::parse_async;

// ── IngestOrchestrator ────────────────────────────────────────────────────────

/// Spawns parses onto the tokio runtime.
///
/// The normalizer is cloned into every parse started from this orchestrator,
/// so unrecognised-code warnings are shared across them.
#[derive(Debug, Clone)]
pub struct IngestOrchestrator {
    config: EngineConfig,
    normalizer: CodeNormalizer,
}

impl IngestOrchestrator {
    pub fn new(config: EngineConfig, normalizer: CodeNormalizer) -> Self {
        Self { config, normalizer }
    }

    /// Start parsing `source` in a background task.
    ///
    /// Returns:
    /// - an `mpsc::Receiver<ParseProgress>`, closed when the parse ends;
    /// - an [`IngestHandle`] to await or abort the parse.
    ///
    /// Progress is best effort: when the receiver lags, snapshots are dropped
    /// rather than stalling the parse.
    pub fn start<R>(
        &self,
        source: R,
        total_bytes: Option<u64>,
    ) -> (mpsc::Receiver<ParseProgress>, IngestHandle)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        let config = self.config.clone();
        let normalizer = self.normalizer.clone();

        let handle = tokio::spawn(async move {
            parse_async(source, total_bytes, &config, normalizer, progress_sender(tx)).await
        });

        (rx, IngestHandle { handle })
    }

    /// Open `path` inside the task and parse it, reporting progress against
    /// the file length.
    pub fn start_file(&self, path: PathBuf) -> (mpsc::Receiver<ParseProgress>, IngestHandle) {
        let (tx, rx) = mpsc::channel(16);
        let config = self.config.clone();
        let normalizer = self.normalizer.clone();

        let handle = tokio::spawn(async move {
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                IngestError::source_read(format!("cannot open {}", path.display()), e)
            })?;
            let total = file.metadata().await.ok().map(|m| m.len());
            tracing::debug!("Parsing {} ({:?} bytes)", path.display(), total);
            parse_async(file, total, &config, normalizer, progress_sender(tx)).await
        });

        (rx, IngestHandle { handle })
    }
}

fn progress_sender(tx: mpsc::Sender<ParseProgress>) -> impl FnMut(ParseProgress) {
    move |progress| {
        if let Err(mpsc::error::TrySendError::Full(dropped)) = tx.try_send(progress) {
            tracing::trace!(percent = dropped.percent, "progress receiver lagging; snapshot dropped");
        }
    }
}

// ── IngestHandle ──────────────────────────────────────────────────────────────

/// A handle to a background parse.
pub struct IngestHandle {
    handle: JoinHandle<Result<ParseOutput>>,
}

impl IngestHandle {
    /// Wait for the parse and return its result. An aborted or panicked task
    /// is reported as an error; no partial output is ever returned.
    pub async fn join(self) -> Result<ParseOutput> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(IngestError::Other(anyhow!("ingest task was aborted"))),
            Err(e) => Err(IngestError::Other(anyhow!("ingest task failed: {e}"))),
        }
    }

    /// Cancel the parse at its next suspension point.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv(rows: usize) -> String {
        let mut out = String::from("service,resource_id,cost\n");
        for i in 0..rows {
            out.push_str(&format!("EC2,i-{},1.0\n", i % 10));
        }
        out
    }

    fn orchestrator() -> IngestOrchestrator {
        let config = EngineConfig {
            batch_lines: 10,
            read_chunk_bytes: 64,
            ..Default::default()
        };
        IngestOrchestrator::new(config, CodeNormalizer::new(8))
    }

    #[tokio::test]
    async fn test_start_streams_progress_and_joins() {
        let data = csv(200);
        let total = data.len() as u64;
        let (mut rx, handle) =
            orchestrator().start(std::io::Cursor::new(data.into_bytes()), Some(total));

        let mut updates = Vec::new();
        while let Some(p) = rx.recv().await {
            updates.push(p);
        }
        let out = handle.join().await.unwrap();

        assert!(!updates.is_empty());
        assert!(updates.iter().all(|p| p.total_bytes == total));
        assert_eq!(out.workloads.len(), 10);
        assert_eq!(out.metadata.processed_rows, 200);
        assert_eq!(out.workloads[0].monthly_cost, 20.0);
    }

    #[tokio::test]
    async fn test_start_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(csv(5).as_bytes()).unwrap();
        let (mut rx, handle) = orchestrator().start_file(file.path().to_path_buf());
        while rx.recv().await.is_some() {}
        let out = handle.join().await.unwrap();
        assert_eq!(out.metadata.total_rows, 5);
    }

    #[tokio::test]
    async fn test_start_file_missing() {
        let (_rx, handle) = orchestrator().start_file(PathBuf::from("/no/such/file.csv"));
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, IngestError::SourceRead { .. }));
    }

    #[tokio::test]
    async fn test_abort_yields_error_not_partial_output() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"service,cost\nEC2,1\n")
            .await
            .unwrap();
        let (_rx, handle) = orchestrator().start(reader, None);
        handle.abort();
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("aborted"));
    }
}
