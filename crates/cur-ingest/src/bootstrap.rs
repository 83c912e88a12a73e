use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context};
use cur_core::formatting::format_bytes;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a CLI level name (`DEBUG`, `INFO`, `WARNING`, `ERROR`) to a tracing
/// filter directive. Unknown names pass through unchanged.
pub fn level_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Logs go to stderr, or are appended to `log_file` when one is given.
/// Falls back to `"info"` if the level string is not a valid directive.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(level_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = log_file.is_none().then(|| {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

// ── Input discovery ────────────────────────────────────────────────────────────

/// Expand directories into the CSV files below them. Fails when nothing is
/// left to ingest.
pub fn resolve_inputs(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let files = cur_stream::reader::expand_inputs(inputs);
    if files.is_empty() {
        bail!("no CSV inputs found in {}", describe(inputs));
    }
    Ok(files)
}

/// Path plus on-disk size, for the per-input summary header.
pub fn input_label(path: &Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) => format!("{} ({})", path.display(), format_bytes(meta.len())),
        Err(_) => path.display().to_string(),
    }
}

fn describe(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_directive_maps_cli_names() {
        assert_eq!(level_directive("DEBUG"), "debug");
        assert_eq!(level_directive("warning"), "warn");
        assert_eq!(level_directive("ERROR"), "error");
        assert_eq!(level_directive("cur_stream=trace"), "cur_stream=trace");
    }

    #[test]
    fn test_resolve_inputs_expands_directories() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("2025-09")).expect("mkdir");
        std::fs::write(tmp.path().join("2025-09").join("cur.csv"), "x").expect("write");
        std::fs::write(tmp.path().join("readme.md"), "x").expect("write");

        let files = resolve_inputs(&[tmp.path().to_path_buf()]).expect("inputs");
        assert_eq!(files, vec![tmp.path().join("2025-09").join("cur.csv")]);
    }

    #[test]
    fn test_resolve_inputs_empty_directory_fails() {
        let tmp = TempDir::new().expect("tempdir");
        let err = resolve_inputs(&[tmp.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains("no CSV inputs"));
    }

    #[test]
    fn test_input_label_includes_size() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("cur.csv");
        std::fs::write(&path, vec![b'x'; 2048]).expect("write");

        let label = input_label(&path);
        assert!(label.starts_with(&path.display().to_string()));
        assert!(label.ends_with(&format!("({})", format_bytes(2048))));

        let missing = tmp.path().join("gone.csv");
        assert_eq!(input_label(&missing), missing.display().to_string());
    }
}
