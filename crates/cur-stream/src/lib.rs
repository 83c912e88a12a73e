//! Streaming ingestion engine.
//!
//! Pulls bounded chunks from a byte source, splits them into lines,
//! tokenizes each line as a CSV record, resolves the header, and folds data
//! rows into deduplicated workloads in strict row order.

pub mod aggregator;
pub mod csv_row;
pub mod header;
pub mod ingest;
pub mod parser;
pub mod reader;
pub mod scheduler;
pub mod stats;
pub mod tokenizer;

pub use cur_core as core;
pub use ingest::{parse_bytes, parse_file, parse_reader};
pub use parser::StreamingParser;
