//! Passive per-parse counters, materialised as [`ParseMetadata`].

use std::collections::{BTreeMap, HashSet};

use cur_core::models::{ParseMetadata, ServiceCategory, SkippedRows, Workload};

/// Why a row did not reach aggregation, or was flagged while aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoProductCode,
    Tax,
    ZeroCost,
    Malformed,
}

#[derive(Debug, Default)]
pub struct StatsCollector {
    total_raw_cost: f64,
    total_rows: u64,
    processed_rows: u64,
    skipped: SkippedRows,
    unrecognized: HashSet<String>,
    cost_by_category: BTreeMap<ServiceCategory, f64>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A non-blank data line was seen.
    pub fn record_row(&mut self) {
        self.total_rows += 1;
    }

    /// A cost field that parsed as a number, whatever happens to the row.
    pub fn record_raw_cost(&mut self, cost: f64) {
        self.total_raw_cost += cost;
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NoProductCode => self.skipped.no_product_code += 1,
            SkipReason::Tax => self.skipped.tax += 1,
            SkipReason::ZeroCost => self.skipped.zero_cost += 1,
            SkipReason::Malformed => self.skipped.malformed += 1,
        }
    }

    /// An accepted row and where its cost went.
    pub fn record_processed(&mut self, category: ServiceCategory, cost: f64) {
        self.processed_rows += 1;
        *self.cost_by_category.entry(category).or_insert(0.0) += cost;
    }

    /// A product code no normalisation step recognised.
    pub fn record_unrecognized(&mut self, code: &str) {
        if !self.unrecognized.contains(code) {
            self.unrecognized.insert(code.to_string());
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn processed_rows(&self) -> u64 {
        self.processed_rows
    }

    /// Build the final metadata. `workloads` must be in output order.
    pub fn finalize(self, workloads: &[Workload]) -> ParseMetadata {
        ParseMetadata {
            total_raw_cost: self.total_raw_cost,
            total_aggregated_cost: workloads.iter().map(|w| w.monthly_cost).sum(),
            total_rows: self.total_rows,
            unique_workloads: workloads.len() as u64,
            skipped_rows: self.skipped,
            processed_rows: self.processed_rows,
            unrecognized_codes: self.unrecognized.len() as u64,
            cost_by_category: self.cost_by_category,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
