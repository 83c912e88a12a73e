use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

// ── EngineConfig ───────────────────────────────────────────────────────────────

/// Limits and batch sizes for one parse. Every field has a default, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lines processed per batch before a suspension point.
    pub batch_lines: usize,
    /// Max bytes per pull from an in-memory buffer.
    pub buffer_chunk_bytes: usize,
    /// Bytes per pull from a streamed source.
    pub read_chunk_bytes: usize,
    /// Decoded chunks larger than this are sub-split before tokenizing.
    pub large_chunk_bytes: usize,
    /// Size of each sub-split piece.
    pub sub_chunk_bytes: usize,
    /// Lines longer than this are truncated with a warning.
    pub max_line_bytes: usize,
    /// Hard cap on an unterminated line held in the tokenizer.
    pub max_pending_line_bytes: usize,
    /// Fields beyond this count are dropped with a warning.
    pub max_fields: usize,
    /// Per-workload cap on recorded usage days.
    pub max_seen_dates: usize,
    /// Hard cap on distinct workloads.
    pub max_workloads: usize,
    /// Bound on the unrecognised-code warn-once set.
    pub unknown_code_cache_capacity: usize,
    /// Row-level warnings emitted at `warn` level per parse; the rest go to `debug`.
    pub max_row_warnings: u64,
    /// Wall-clock budget for one parse.
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_lines: 1000,
            buffer_chunk_bytes: 10 * 1024 * 1024,
            read_chunk_bytes: 64 * 1024,
            large_chunk_bytes: 1024 * 1024,
            sub_chunk_bytes: 100 * 1024,
            max_line_bytes: 10 * 1024 * 1024,
            max_pending_line_bytes: 64 * 1024 * 1024,
            max_fields: 10_000,
            max_seen_dates: 1000,
            max_workloads: 2_000_000,
            unknown_code_cache_capacity: crate::normalize::DEFAULT_UNKNOWN_CODE_CAPACITY,
            max_row_warnings: 20,
            timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Default location: `~/.cur-ingest/config.json`.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".cur-ingest").join("config.json")
    }

    /// Load from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path. A missing or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sizes that would stall the engine.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("batch_lines", self.batch_lines),
            ("buffer_chunk_bytes", self.buffer_chunk_bytes),
            ("read_chunk_bytes", self.read_chunk_bytes),
            ("sub_chunk_bytes", self.sub_chunk_bytes),
            ("max_line_bytes", self.max_line_bytes),
            ("max_fields", self.max_fields),
            ("max_workloads", self.max_workloads),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(IngestError::Config(format!("{name} must be greater than zero")));
        }
        if self.max_pending_line_bytes < self.max_line_bytes {
            return Err(IngestError::Config(
                "max_pending_line_bytes must be at least max_line_bytes".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(IngestError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Stream billing exports into deduplicated workload cost aggregates
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cur-ingest",
    about = "Stream billing exports into deduplicated workload cost aggregates",
    version
)]
pub struct Settings {
    /// CSV files or directories to ingest
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write workloads as JSON lines to this file (stdout when omitted)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Write parse metadata for every input as JSON to this file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Engine config file (defaults to ~/.cur-ingest/config.json)
    #[arg(long, env = "CUR_INGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lines processed per batch
    #[arg(long)]
    pub batch_lines: Option<usize>,

    /// Hard cap on distinct workloads per input
    #[arg(long)]
    pub max_workloads: Option<usize>,

    /// Wall-clock budget per input, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Do not log progress updates
    #[arg(long)]
    pub no_progress: bool,
}

impl Settings {
    /// Effective log level after `--debug`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    /// Load the engine config (explicit path, else default location) and
    /// apply CLI overrides. CLI values always win.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let base = match &self.config {
            Some(path) => EngineConfig::load_from(path)?,
            None => EngineConfig::load()?,
        };
        self.apply_overrides(base)
    }

    /// Apply CLI overrides on top of `config` and validate the result.
    pub fn apply_overrides(&self, mut config: EngineConfig) -> Result<EngineConfig> {
        if let Some(v) = self.batch_lines {
            config.batch_lines = v;
        }
        if let Some(v) = self.max_workloads {
            config.max_workloads = v;
        }
        if let Some(v) = self.timeout_secs {
            config.timeout_secs = Some(v);
        }
        config.validate()?;
        Ok(config)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(tmp: &TempDir, json: &str) -> PathBuf {
        let path = EngineConfig::config_path_in(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, json).unwrap();
        path
    }

    // ── EngineConfig ─────────────────────────────────────────────────────────

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_lines, 1000);
        assert_eq!(config.max_seen_dates, 1000);
        assert_eq!(config.max_workloads, 2_000_000);
        assert_eq!(config.max_fields, 10_000);
        assert_eq!(config.sub_chunk_bytes, 100 * 1024);
        assert!(config.timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, r#"{"batch_lines": 250, "timeout_secs": 30}"#);

        let config = EngineConfig::load_from(&path).expect("load");
        assert_eq!(config.batch_lines, 250);
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.max_workloads, 2_000_000);
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, "{not json");
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(IngestError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_explicit_file_is_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("nope.json");
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(IngestError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = EngineConfig {
            batch_lines: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_lines"));

        let config = EngineConfig {
            timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_pending_below_line_cap() {
        let config = EngineConfig {
            max_line_bytes: 100,
            max_pending_line_bytes: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    // ── Settings ─────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["cur-ingest", "report.csv"]);
        assert_eq!(settings.inputs, vec![PathBuf::from("report.csv")]);
        assert!(settings.output.is_none());
        assert_eq!(settings.log_level, "INFO");
        assert!(!settings.debug);
        assert!(!settings.no_progress);
    }

    #[test]
    fn test_settings_requires_input() {
        assert!(Settings::try_parse_from(["cur-ingest"]).is_err());
    }

    #[test]
    fn test_settings_debug_overrides_log_level() {
        let settings = Settings::parse_from(["cur-ingest", "a.csv", "--debug"]);
        assert_eq!(settings.effective_log_level(), "DEBUG");
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let tmp = TempDir::new().expect("tempdir");
        let path = write_config(&tmp, r#"{"batch_lines": 250, "max_workloads": 10}"#);
        let settings = Settings::parse_from([
            "cur-ingest".to_string(),
            "a.csv".to_string(),
            "--config".to_string(),
            path.display().to_string(),
            "--batch-lines".to_string(),
            "50".to_string(),
        ]);

        let config = settings.engine_config().expect("config");
        assert_eq!(config.batch_lines, 50);
        assert_eq!(config.max_workloads, 10);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let settings =
            Settings::parse_from(["cur-ingest", "a.csv", "--max-workloads", "0"]);
        assert!(settings.apply_overrides(EngineConfig::default()).is_err());
    }
}
