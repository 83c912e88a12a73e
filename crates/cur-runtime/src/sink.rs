//! Persistence seam for finished workloads.
//!
//! A parse produces its full result before anything is saved, so a sink
//! never observes a partial workload set.

use std::collections::HashMap;
use std::io::{BufWriter, Write};

use cur_core::error::Result;
use cur_core::models::{ParseMetadata, ParseOutput, Workload};

/// Receives workloads one at a time.
pub trait WorkloadSink {
    fn save(&mut self, workload: Workload) -> Result<()>;

    /// Persist anything buffered. Called once after the last `save`.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Save every workload of a successful parse to `sink`, then flush.
/// Returns the parse metadata.
pub fn deliver<S>(output: ParseOutput, sink: &mut S) -> Result<ParseMetadata>
where
    S: WorkloadSink + ?Sized,
{
    let count = output.workloads.len();
    for workload in output.workloads {
        sink.save(workload)?;
    }
    sink.flush()?;
    tracing::debug!(workloads = count, "delivered to sink");
    Ok(output.metadata)
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// In-memory sink that merges workloads sharing an id, keeping first-seen
/// order. Used to combine several exports into one view.
#[derive(Debug, Default)]
pub struct MemorySink {
    index: HashMap<String, usize>,
    workloads: Vec<Workload>,
    seen_dates_cap: usize,
}

impl MemorySink {
    pub fn new(seen_dates_cap: usize) -> Self {
        Self {
            seen_dates_cap,
            ..Default::default()
        }
    }

    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }

    pub fn into_workloads(self) -> Vec<Workload> {
        self.workloads
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }
}

impl WorkloadSink for MemorySink {
    fn save(&mut self, workload: Workload) -> Result<()> {
        match self.index.get(&workload.id) {
            Some(&slot) => self.workloads[slot].merge(&workload, self.seen_dates_cap),
            None => {
                self.index.insert(workload.id.clone(), self.workloads.len());
                self.workloads.push(workload);
            }
        }
        Ok(())
    }
}

// ── JsonLinesSink ─────────────────────────────────────────────────────────────

/// Writes one camelCase JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> WorkloadSink for JsonLinesSink<W> {
    fn save(&mut self, workload: Workload) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &workload)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
