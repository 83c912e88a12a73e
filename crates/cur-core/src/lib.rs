//! Core domain layer for the CUR ingestion engine.
//!
//! Holds the workload/metadata model, the error type, engine configuration,
//! and the vendor vocabulary tables used to normalise billing rows.

pub mod dates;
pub mod error;
pub mod formatting;
pub mod instance;
pub mod models;
pub mod normalize;
pub mod settings;

pub use error::{CapacityKind, IngestError, Result};
