//! The streaming parse state machine.
//!
//! A [`StreamingParser`] is fed decoded text with [`StreamingParser::push_text`]
//! and advanced one bounded batch at a time with
//! [`StreamingParser::process_batch`]. Drivers decide what happens between
//! batches (thread yield, task yield, progress report); the parser itself
//! never blocks and never loops over more than one batch.

use cur_core::error::{IngestError, Result};
use cur_core::models::ParseOutput;
use cur_core::normalize::CodeNormalizer;
use cur_core::settings::EngineConfig;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregationStore, BillingRow};
use crate::csv_row::{CsvRowParser, ParsedRow};
use crate::header::{ColumnIndex, HeaderResolver};
use crate::stats::{SkipReason, StatsCollector};
use crate::tokenizer::LineTokenizer;

// ── RowWarnings ───────────────────────────────────────────────────────────────

/// Rate limiter for row-level diagnostics: the first `budget` go to `warn!`,
/// the rest to `debug!`.
#[derive(Debug)]
struct RowWarnings {
    budget: u64,
    emitted: u64,
    suppressed: u64,
}

impl RowWarnings {
    fn new(budget: u64) -> Self {
        Self {
            budget,
            emitted: 0,
            suppressed: 0,
        }
    }

    fn report(&mut self, line: u64, message: impl Into<String>) {
        let err = IngestError::RowParse {
            line,
            message: message.into(),
        };
        if self.emitted < self.budget {
            self.emitted += 1;
            warn!("{err}");
        } else {
            self.suppressed += 1;
            debug!("{err}");
        }
    }
}

// ── StreamingParser ───────────────────────────────────────────────────────────

pub struct StreamingParser {
    batch_lines: usize,
    tokenizer: LineTokenizer,
    rows: CsvRowParser,
    normalizer: CodeNormalizer,
    /// `None` until the header line has been resolved.
    columns: Option<ColumnIndex>,
    store: AggregationStore,
    stats: StatsCollector,
    warnings: RowWarnings,
    lines_processed: u64,
}

impl StreamingParser {
    /// A parser for one input. `normalizer` may be shared with other parses
    /// to share its warn-once cache.
    pub fn new(config: &EngineConfig, normalizer: CodeNormalizer) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            batch_lines: config.batch_lines,
            tokenizer: LineTokenizer::new(config.max_pending_line_bytes),
            rows: CsvRowParser::new(config.max_line_bytes, config.max_fields),
            normalizer,
            columns: None,
            store: AggregationStore::new(config.max_workloads, config.max_seen_dates),
            stats: StatsCollector::new(),
            warnings: RowWarnings::new(config.max_row_warnings),
            lines_processed: 0,
        })
    }

    /// Queue decoded text. No lines are processed here.
    pub fn push_text(&mut self, text: &str) -> Result<()> {
        self.tokenizer.push(text)
    }

    /// Signal end of input so a trailing line without newline is processed.
    pub fn end_input(&mut self) {
        self.tokenizer.finish();
    }

    pub fn has_ready_lines(&self) -> bool {
        self.tokenizer.has_line()
    }

    /// Physical lines consumed so far, header and blank lines included.
    pub fn lines_processed(&self) -> u64 {
        self.lines_processed
    }

    /// Process up to one batch of ready lines. Returns how many were taken.
    pub fn process_batch(&mut self) -> Result<usize> {
        let mut taken = 0;
        while taken < self.batch_lines {
            let Some(line) = self.tokenizer.next_line() else {
                break;
            };
            taken += 1;
            self.process_line(&line)?;
        }
        if taken > 0 {
            debug!(
                lines = taken,
                total = self.lines_processed,
                workloads = self.store.len(),
                "batch processed"
            );
        }
        Ok(taken)
    }

    /// Drain whatever is left and produce the result.
    ///
    /// Fails with [`IngestError::EmptyData`] when no header or no data row
    /// was seen.
    pub fn finish(mut self) -> Result<ParseOutput> {
        self.tokenizer.finish();
        while self.process_batch()? > 0 {}

        if self.columns.is_none() || self.stats.total_rows() == 0 {
            return Err(IngestError::EmptyData);
        }
        if self.warnings.suppressed > 0 {
            warn!(
                suppressed = self.warnings.suppressed,
                "further row warnings were logged at debug level"
            );
        }

        let workloads = self.store.into_workloads();
        let metadata = self.stats.finalize(&workloads);
        info!(
            rows = metadata.total_rows,
            processed = metadata.processed_rows,
            workloads = metadata.unique_workloads,
            no_product_code = metadata.skipped_rows.no_product_code,
            tax = metadata.skipped_rows.tax,
            zero_cost = metadata.skipped_rows.zero_cost,
            malformed = metadata.skipped_rows.malformed,
            total_raw_cost = metadata.total_raw_cost,
            "parse complete"
        );
        Ok(ParseOutput {
            workloads,
            metadata,
        })
    }

    fn process_line(&mut self, line: &str) -> Result<()> {
        self.lines_processed += 1;
        let line_no = self.lines_processed;
        if line.trim().is_empty() {
            return Ok(());
        }

        let parsed = self.rows.parse(line);
        self.report_repairs(line_no, &parsed);

        let Some(columns) = &self.columns else {
            self.columns = Some(HeaderResolver::resolve(&parsed.fields)?);
            return Ok(());
        };

        self.stats.record_row();
        if parsed.fields.is_empty() {
            self.stats.record_skip(SkipReason::Malformed);
            self.warnings.report(line_no, "no fields could be extracted");
            return Ok(());
        }

        let row = BillingRow::from_fields(&parsed.fields, columns);
        self.store.apply(&row, &self.normalizer, &mut self.stats)?;
        Ok(())
    }

    fn report_repairs(&mut self, line_no: u64, parsed: &ParsedRow) {
        if !parsed.has_issues() {
            return;
        }
        if let Some(len) = parsed.truncated_from {
            self.warnings
                .report(line_no, format!("line of {len} bytes truncated"));
        }
        if parsed.dropped_fields > 0 {
            self.warnings.report(
                line_no,
                format!("{} fields beyond the limit dropped", parsed.dropped_fields),
            );
        }
        if parsed.unclosed_quote {
            self.warnings
                .report(line_no, "unclosed quote closed at end of line");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "service,resource_id,cost\n\
                          EC2,i-1,10.00\n\
                          EC2,i-1,5.50\n\
                          TAX,,3.00\n\
                          EC2,i-2,0.00\n\
                          2025-09-22T09:00:00Z,i-3,1.00\n";

    fn config() -> EngineConfig {
        EngineConfig {
            batch_lines: 2,
            ..Default::default()
        }
    }

    fn run(chunks: &[&str], config: &EngineConfig) -> Result<ParseOutput> {
        let mut parser = StreamingParser::new(config, CodeNormalizer::new(16))?;
        for chunk in chunks {
            parser.push_text(chunk)?;
            while parser.has_ready_lines() {
                parser.process_batch()?;
            }
        }
        parser.end_input();
        parser.finish()
    }

    // ── Aggregation ───────────────────────────────────────────────────────────

    #[test]
    fn test_sample_aggregates() {
        let out = run(&[SAMPLE], &config()).unwrap();
        let m = &out.metadata;
        assert_eq!(out.workloads.len(), 2);
        assert_eq!(out.workloads[0].monthly_cost, 15.5);
        assert_eq!(out.workloads[1].monthly_cost, 0.0);
        assert_eq!(m.total_rows, 5);
        assert_eq!(m.processed_rows, 3);
        assert_eq!(m.skipped_rows.tax, 1);
        assert_eq!(m.skipped_rows.zero_cost, 1);
        assert_eq!(m.skipped_rows.no_product_code, 1);
        assert!((m.total_raw_cost - 19.5).abs() < 1e-9);
        assert_eq!(m.total_aggregated_cost, 15.5);
    }

    #[test]
    fn test_chunk_split_invariance() {
        let whole = run(&[SAMPLE], &config()).unwrap();
        for step in [1, 2, 3, 7, 13] {
            let pieces: Vec<String> = SAMPLE
                .chars()
                .collect::<Vec<_>>()
                .chunks(step)
                .map(|c| c.iter().collect())
                .collect();
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            assert_eq!(run(&refs, &config()).unwrap(), whole, "step {step}");
        }
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let out = run(&["service,cost\nEC2,1\nS3,2"], &config()).unwrap();
        assert_eq!(out.workloads.len(), 2);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let out = run(&["\nservice,cost\n\n  \nEC2,1\n\n"], &config()).unwrap();
        assert_eq!(out.metadata.total_rows, 1);
    }

    #[test]
    fn test_lines_processed_counts_everything() {
        let mut parser = StreamingParser::new(&config(), CodeNormalizer::new(4)).unwrap();
        parser.push_text("service,cost\n\nEC2,1\n").unwrap();
        while parser.process_batch().unwrap() > 0 {}
        assert_eq!(parser.lines_processed(), 3);
    }

    #[test]
    fn test_batch_is_bounded() {
        let mut parser = StreamingParser::new(&config(), CodeNormalizer::new(4)).unwrap();
        parser.push_text("service,cost\nEC2,1\nEC2,2\nEC2,3\n").unwrap();
        assert_eq!(parser.process_batch().unwrap(), 2);
        assert!(parser.has_ready_lines());
        assert_eq!(parser.process_batch().unwrap(), 2);
        assert!(!parser.has_ready_lines());
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[test]
    fn test_header_only_is_empty_data() {
        let err = run(&["service,cost\n"], &config()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyData));
        let err = run(&[""], &config()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyData));
    }

    #[test]
    fn test_missing_product_column_fails() {
        let err = run(&["id,cost\n1,2\n"], &config()).unwrap_err();
        assert!(matches!(err, IngestError::HeaderResolution { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = EngineConfig {
            batch_lines: 0,
            ..Default::default()
        };
        assert!(StreamingParser::new(&bad, CodeNormalizer::new(4)).is_err());
    }

    // ── Row repairs ───────────────────────────────────────────────────────────

    #[test]
    fn test_row_without_fields_counted_as_malformed() {
        let mut parser = StreamingParser::new(&config(), CodeNormalizer::new(4)).unwrap();
        parser.push_text("service,cost\n").unwrap();
        parser.process_batch().unwrap();
        // A limit below the first char's width leaves nothing to split.
        parser.rows = CsvRowParser::new(1, 10);
        parser.push_text("€,1\n").unwrap();
        parser.process_batch().unwrap();
        let out = parser.finish().unwrap();
        assert_eq!(out.metadata.total_rows, 1);
        assert_eq!(out.metadata.skipped_rows.malformed, 1);
        assert!(out.workloads.is_empty());
    }

    #[test]
    fn test_unclosed_quote_row_still_processed() {
        let out = run(&["service,resource_id,cost\nEC2,\"i-1,5\n"], &config()).unwrap();
        assert_eq!(out.metadata.total_rows, 1);
        assert_eq!(out.workloads[0].name, "i-1,5");
        assert_eq!(out.workloads[0].monthly_cost, 0.0);
    }
}
