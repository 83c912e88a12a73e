use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::formatting::{format_count, format_currency, percentage};

/// Broad service category a canonical service belongs to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCategory {
    Compute,
    Storage,
    Database,
    Networking,
    Containers,
    Serverless,
    Analytics,
    MachineLearning,
    Messaging,
    Security,
    Management,
    Marketplace,
    Support,
    /// Sentinel: rows in this category are excluded from aggregation.
    Tax,
    #[default]
    Other,
}

impl ServiceCategory {
    /// The canonical snake_case identifier for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Compute => "compute",
            ServiceCategory::Storage => "storage",
            ServiceCategory::Database => "database",
            ServiceCategory::Networking => "networking",
            ServiceCategory::Containers => "containers",
            ServiceCategory::Serverless => "serverless",
            ServiceCategory::Analytics => "analytics",
            ServiceCategory::MachineLearning => "machine_learning",
            ServiceCategory::Messaging => "messaging",
            ServiceCategory::Security => "security",
            ServiceCategory::Management => "management",
            ServiceCategory::Marketplace => "marketplace",
            ServiceCategory::Support => "support",
            ServiceCategory::Tax => "tax",
            ServiceCategory::Other => "other",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage window covered by the rows of one workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest usage start seen.
    pub start: Option<DateTime<Utc>>,
    /// Latest usage end seen.
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Widen the range so it covers `start..end`. Either bound may be absent.
    pub fn expand(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) {
        if let Some(s) = start {
            self.start = Some(self.start.map_or(s, |cur| cur.min(s)));
        }
        // A row without an end date still extends the range to its start.
        if let Some(e) = end.or(start) {
            self.end = Some(self.end.map_or(e, |cur| cur.max(e)));
        }
    }
}

/// Aggregate cost and metadata for one logical billed resource.
///
/// One workload exists per dedupe key; every row mapping to the key adds its
/// cost to [`Workload::monthly_cost`] and widens [`Workload::date_range`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    /// The dedupe key: `{resource}_{service}_{region}`, lower-cased.
    pub id: String,
    /// Resource id from the report, or `{service}_{region}_aggregated`.
    pub name: String,
    /// Canonical service name (e.g. `EC2`).
    pub service: String,
    pub category: ServiceCategory,
    #[serde(default)]
    pub os: String,
    /// vCPU count, 0 when unknown.
    #[serde(default)]
    pub cpu: u32,
    /// Memory in GiB, 0 when unknown.
    #[serde(default)]
    pub memory: f64,
    /// Summed storage usage (GB) for storage workloads.
    #[serde(default)]
    pub storage: f64,
    /// Sign-preserving sum of the cost of every matching row.
    pub monthly_cost: f64,
    #[serde(default)]
    pub region: String,
    /// Summed data-transfer usage (GB).
    #[serde(default)]
    pub monthly_traffic: f64,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub instance_type: String,
    /// First raw product/service code that mapped to this workload.
    #[serde(default)]
    pub raw_service_code: String,
    #[serde(default)]
    pub date_range: DateRange,
    /// Distinct usage-start days, capped per parse.
    #[serde(default)]
    pub seen_dates: BTreeSet<NaiveDate>,
}

impl Workload {
    /// Record a usage-start day unless it is already present or the cap
    /// has been reached. Returns `true` when the day was added.
    pub fn record_seen_date(&mut self, day: NaiveDate, cap: usize) -> bool {
        if self.seen_dates.len() >= cap {
            return false;
        }
        self.seen_dates.insert(day)
    }

    /// Fold another workload with the same id into this one.
    ///
    /// Costs and usage amounts are summed, the date range widened and seen
    /// dates unioned up to `seen_dates_cap`. Descriptive fields keep their
    /// current values unless empty.
    pub fn merge(&mut self, other: &Workload, seen_dates_cap: usize) {
        self.monthly_cost += other.monthly_cost;
        self.storage += other.storage;
        self.monthly_traffic += other.monthly_traffic;
        self.date_range
            .expand(other.date_range.start, other.date_range.end);
        for day in &other.seen_dates {
            self.record_seen_date(*day, seen_dates_cap);
        }
        if self.os.is_empty() {
            self.os = other.os.clone();
        }
        if self.instance_type.is_empty() && !other.instance_type.is_empty() {
            self.instance_type = other.instance_type.clone();
            self.cpu = other.cpu;
            self.memory = other.memory;
        }
        for dep in &other.dependencies {
            if !self.dependencies.contains(dep) {
                self.dependencies.push(dep.clone());
            }
        }
    }
}

/// Rows excluded from (or flagged during) aggregation, by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRows {
    /// Empty or date-like product code.
    pub no_product_code: u64,
    /// Product code normalised to the tax sentinel.
    pub tax: u64,
    /// Zero-cost rows. These are still aggregated.
    pub zero_cost: u64,
    /// Rows the tokenizer could not split into fields.
    #[serde(default)]
    pub malformed: u64,
}

/// Cross-checkable statistics for one parse run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseMetadata {
    /// Sum of every numeric cost field, accepted or not.
    pub total_raw_cost: f64,
    /// Sum of `monthly_cost` across the returned workloads.
    pub total_aggregated_cost: f64,
    /// Non-blank data lines seen (header excluded).
    pub total_rows: u64,
    pub unique_workloads: u64,
    pub skipped_rows: SkippedRows,
    pub processed_rows: u64,
    /// Distinct product codes that matched no normalisation rule.
    #[serde(default)]
    pub unrecognized_codes: u64,
    /// Accepted-row cost per category.
    #[serde(default)]
    pub cost_by_category: BTreeMap<ServiceCategory, f64>,
}

/// Progress snapshot emitted at chunk boundaries when the total size is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseProgress {
    pub bytes_processed: u64,
    pub total_bytes: u64,
    /// `0.0..=100.0`.
    pub percent: f64,
    pub lines_processed: u64,
}

impl ParseProgress {
    /// Build a snapshot, clamping the percentage to 100.
    pub fn new(bytes_processed: u64, total_bytes: u64, lines_processed: u64) -> Self {
        let percent = if total_bytes == 0 {
            100.0
        } else {
            ((bytes_processed as f64 / total_bytes as f64) * 100.0).min(100.0)
        };
        Self {
            bytes_processed,
            total_bytes,
            percent,
            lines_processed,
        }
    }
}

/// The complete result of a successful parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutput {
    /// Workloads in first-seen-key order.
    pub workloads: Vec<Workload>,
    pub metadata: ParseMetadata,
}

impl ParseOutput {
    /// Human-readable multi-line summary of the run.
    pub fn summary(&self) -> String {
        let m = &self.metadata;
        let mut out = format!(
            "Rows: {} total, {} processed\n\
             Skipped: {} no product code, {} tax, {} malformed ({} zero-cost kept)\n\
             Workloads: {}\n\
             Raw cost: {}\n\
             Aggregated cost: {}",
            format_count(m.total_rows),
            format_count(m.processed_rows),
            format_count(m.skipped_rows.no_product_code),
            format_count(m.skipped_rows.tax),
            format_count(m.skipped_rows.malformed),
            format_count(m.skipped_rows.zero_cost),
            format_count(m.unique_workloads),
            format_currency(m.total_raw_cost),
            format_currency(m.total_aggregated_cost),
        );
        if m.unrecognized_codes > 0 {
            out.push_str(&format!(
                "\nUnrecognised codes: {}",
                format_count(m.unrecognized_codes)
            ));
        }
        for (category, cost) in &m.cost_by_category {
            out.push_str(&format!(
                "\n  {:<18}{:>16}  {:>5.1}%",
                category.as_str(),
                format_currency(*cost),
                percentage(*cost, m.total_aggregated_cost, 1)
            ));
        }
        out
    }
}
