use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which hard limit a [`IngestError::CapacityExceeded`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// Number of distinct workloads held by one parse.
    Workloads,
    /// Bytes of a single unterminated line held in the tokenizer buffer.
    LineLength,
}

impl fmt::Display for CapacityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacityKind::Workloads => f.write_str("distinct workloads"),
            CapacityKind::LineLength => f.write_str("line length (bytes)"),
        }
    }
}

/// All errors produced by the ingestion engine.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The byte source failed or produced bytes that are not valid UTF-8.
    #[error("Failed to read source: {message}")]
    SourceRead {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The header line has no column matching a required semantic column.
    #[error("Required column '{column}' not found in header")]
    HeaderResolution { column: String },

    /// The input has no header, or a header and no data rows.
    #[error("No data rows found in input")]
    EmptyData,

    /// A single row could not be tokenized or processed. Never fatal.
    #[error("Row {line} skipped: {message}")]
    RowParse { line: u64, message: String },

    /// A hard cap was hit; the parse is aborted rather than truncated.
    #[error("Capacity exceeded: {cap} limit of {limit} reached")]
    CapacityExceeded { cap: CapacityKind, limit: usize },

    /// The caller-supplied wall-clock budget ran out.
    #[error("Parse exceeded time budget of {limit:?}")]
    Timeout { limit: Duration },

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON document could not be parsed or written.
    #[error("Failed to process JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Pass-through for raw I/O errors outside of source reads (sinks, config).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IngestError {
    /// Build a [`IngestError::SourceRead`] wrapping an I/O failure.
    pub fn source_read(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SourceRead {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Build a [`IngestError::SourceRead`] with no underlying I/O error
    /// (e.g. a decode failure).
    pub fn decode(message: impl Into<String>) -> Self {
        Self::SourceRead {
            message: message.into(),
            source: None,
        }
    }

    /// `false` only for errors the engine recovers from by skipping a row.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IngestError::RowParse { .. })
    }
}

/// Convenience alias used throughout the ingestion crates.
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_source_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream reset");
        let err = IngestError::source_read("chunk 3", io_err);
        let msg = err.to_string();
        assert_eq!(msg, "Failed to read source: chunk 3");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_display_decode_has_no_source() {
        let err = IngestError::decode("invalid UTF-8 at byte 17");
        assert_eq!(err.to_string(), "Failed to read source: invalid UTF-8 at byte 17");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_error_display_header_resolution_names_column() {
        let err = IngestError::HeaderResolution {
            column: "productCode".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Required column 'productCode' not found in header"
        );
    }

    #[test]
    fn test_error_display_capacity_names_cap() {
        let err = IngestError::CapacityExceeded {
            cap: CapacityKind::Workloads,
            limit: 2_000_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("distinct workloads"));
        assert!(msg.contains("2000000"));
    }

    #[test]
    fn test_error_display_timeout() {
        let err = IngestError::Timeout {
            limit: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Parse exceeded time budget of 5s");
    }

    #[test]
    fn test_row_parse_is_not_fatal() {
        let err = IngestError::RowParse {
            line: 12,
            message: "no fields".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(IngestError::EmptyData.is_fatal());
        assert!(IngestError::Config("x".into()).is_fatal());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: IngestError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: IngestError = json_err.into();
        assert!(err.to_string().contains("Failed to process JSON"));
    }
}
