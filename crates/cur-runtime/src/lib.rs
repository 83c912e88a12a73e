//! Async runtime layer for the ingestion engine.
//!
//! Drives [`cur_stream::StreamingParser`] from tokio sources, runs parses in
//! background tasks with progress over a channel, and hands finished results
//! to persistence sinks.

pub mod driver;
pub mod orchestrator;
pub mod sink;

pub use cur_core as core;
pub use cur_stream as stream;
pub use driver::parse_async;
pub use orchestrator::{IngestHandle, IngestOrchestrator};
pub use sink::{deliver, JsonLinesSink, MemorySink, WorkloadSink};
