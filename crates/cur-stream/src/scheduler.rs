//! Batch scheduling: bounded work between suspension points and the
//! wall-clock budget.

use std::time::{Duration, Instant};

use cur_core::error::{IngestError, Result};

use crate::parser::StreamingParser;

/// Wall-clock budget for one parse. Unlimited when no limit is set.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fail with [`IngestError::Timeout`] once the budget is spent.
    pub fn check(&self) -> Result<()> {
        match self.limit {
            Some(limit) if self.started.elapsed() > limit => Err(IngestError::Timeout { limit }),
            _ => Ok(()),
        }
    }
}

/// Process every ready line in batches, calling `suspend` after each batch
/// and checking the deadline before the next one.
pub fn drain_ready(
    parser: &mut StreamingParser,
    deadline: &Deadline,
    mut suspend: impl FnMut(),
) -> Result<()> {
    while parser.has_ready_lines() {
        deadline.check()?;
        parser.process_batch()?;
        suspend();
    }
    Ok(())
}
