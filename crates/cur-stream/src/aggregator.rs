//! Row acceptance and workload aggregation.
//!
//! Every data row passes the same ordered checks: missing product code,
//! date-like product code (column misalignment), tax sentinel, zero cost.
//! Accepted rows are folded into one [`Workload`] per dedupe key, and
//! workloads keep the order in which their key was first seen.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use cur_core::dates::{looks_like_iso_date, parse_usage_date};
use cur_core::error::{CapacityKind, IngestError, Result};
use cur_core::instance::InstanceSpecResolver;
use cur_core::models::{ServiceCategory, Workload};
use cur_core::normalize::{CodeNormalizer, NormalizedService};
use tracing::debug;

use crate::header::{Column, ColumnIndex};
use crate::stats::{SkipReason, StatsCollector};

// ── BillingRow ────────────────────────────────────────────────────────────────

/// Typed view of one tokenized data row. Absent columns read as empty or
/// `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingRow<'a> {
    pub product_code: &'a str,
    pub resource_id: &'a str,
    pub usage_type: &'a str,
    /// `None` when the cost is empty or not a finite number.
    pub cost: Option<f64>,
    pub instance_type: &'a str,
    pub os: &'a str,
    pub region: &'a str,
    /// `None` when the column is absent or the value is not a number.
    pub usage_amount: Option<f64>,
    pub usage_start: Option<DateTime<Utc>>,
    pub usage_end: Option<DateTime<Utc>>,
}

impl<'a> BillingRow<'a> {
    pub fn from_fields(fields: &'a [String], columns: &ColumnIndex) -> Self {
        let get = |column| columns.field(fields, column);
        Self {
            product_code: get(Column::ProductCode),
            resource_id: get(Column::ResourceId),
            usage_type: get(Column::UsageType),
            cost: parse_number(get(Column::Cost)),
            instance_type: get(Column::InstanceType),
            os: get(Column::Os),
            region: get(Column::Region),
            usage_amount: parse_number(get(Column::UsageAmount)),
            usage_start: parse_usage_date(get(Column::UsageStartDate)),
            usage_end: parse_usage_date(get(Column::UsageEndDate)),
        }
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Skipped(SkipReason),
    Aggregated { zero_cost: bool },
}

// ── AggregationStore ──────────────────────────────────────────────────────────

/// Dedupe-key → workload map that preserves first-seen order.
#[derive(Debug)]
pub struct AggregationStore {
    index: HashMap<String, usize>,
    workloads: Vec<Workload>,
    max_workloads: usize,
    max_seen_dates: usize,
}

impl AggregationStore {
    pub fn new(max_workloads: usize, max_seen_dates: usize) -> Self {
        Self {
            index: HashMap::new(),
            workloads: Vec::new(),
            max_workloads,
            max_seen_dates,
        }
    }

    pub fn len(&self) -> usize {
        self.workloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workloads.is_empty()
    }

    /// Apply the acceptance policy to `row` and aggregate it when accepted.
    ///
    /// A numeric cost always reaches `stats` as raw cost, even for skipped
    /// rows. Fails only when a new key would exceed the workload cap.
    pub fn apply(
        &mut self,
        row: &BillingRow<'_>,
        normalizer: &CodeNormalizer,
        stats: &mut StatsCollector,
    ) -> Result<RowOutcome> {
        if let Some(cost) = row.cost {
            stats.record_raw_cost(cost);
        }

        if row.product_code.is_empty() || looks_like_iso_date(row.product_code) {
            stats.record_skip(SkipReason::NoProductCode);
            return Ok(RowOutcome::Skipped(SkipReason::NoProductCode));
        }

        let service = normalizer.normalize(row.product_code);
        if !service.is_resolved() {
            stats.record_unrecognized(&row.product_code.to_uppercase());
        }
        if service.is_tax() {
            stats.record_skip(SkipReason::Tax);
            return Ok(RowOutcome::Skipped(SkipReason::Tax));
        }

        let cost = row.cost.unwrap_or(0.0);
        let zero_cost = cost == 0.0;
        if zero_cost {
            stats.record_skip(SkipReason::ZeroCost);
        }

        self.aggregate(row, &service, cost)?;
        stats.record_processed(service.category, cost);
        Ok(RowOutcome::Aggregated { zero_cost })
    }

    /// Consume the store, yielding workloads in first-seen order.
    pub fn into_workloads(self) -> Vec<Workload> {
        self.workloads
    }

    fn aggregate(
        &mut self,
        row: &BillingRow<'_>,
        service: &NormalizedService,
        cost: f64,
    ) -> Result<()> {
        let region = row.region;
        let resource = if row.resource_id.is_empty() {
            format!("{}_{}_aggregated", service.name, region)
        } else {
            row.resource_id.to_string()
        };
        let key = dedupe_key(&resource, &service.name, region);

        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                if self.workloads.len() >= self.max_workloads {
                    return Err(IngestError::CapacityExceeded {
                        cap: CapacityKind::Workloads,
                        limit: self.max_workloads,
                    });
                }
                let slot = self.workloads.len();
                self.workloads
                    .push(new_workload(key.clone(), resource, service, row));
                self.index.insert(key, slot);
                slot
            }
        };

        let max_seen_dates = self.max_seen_dates;
        let workload = &mut self.workloads[slot];
        workload.monthly_cost += cost;
        workload.date_range.expand(row.usage_start, row.usage_end);
        if let Some(start) = row.usage_start {
            let day = start.date_naive();
            if !workload.record_seen_date(day, max_seen_dates)
                && !workload.seen_dates.contains(&day)
            {
                debug!(workload = %workload.id, cap = max_seen_dates, "seen-dates cap reached");
            }
        }

        if workload.os.is_empty() && !row.os.is_empty() {
            workload.os = row.os.to_string();
        }
        if workload.instance_type.is_empty() && !row.instance_type.is_empty() {
            let spec = InstanceSpecResolver::resolve(row.instance_type);
            workload.instance_type = row.instance_type.to_string();
            workload.cpu = spec.cpu;
            workload.memory = spec.memory;
        }

        if let Some(amount) = row.usage_amount {
            let usage_type = row.usage_type.to_uppercase();
            if service.category == ServiceCategory::Storage && usage_type.contains("GB") {
                workload.storage += amount;
            }
            if usage_type.contains("DATATRANSFER") {
                workload.monthly_traffic += amount;
            }
        }
        Ok(())
    }
}

/// `{resource}_{service}_{region}`, lower-cased.
pub fn dedupe_key(resource: &str, service: &str, region: &str) -> String {
    format!("{}_{}_{}", resource, service, region).to_lowercase()
}

fn new_workload(
    id: String,
    name: String,
    service: &NormalizedService,
    row: &BillingRow<'_>,
) -> Workload {
    Workload {
        id,
        name,
        service: service.name.clone(),
        category: service.category,
        region: row.region.to_string(),
        raw_service_code: row.product_code.to_string(),
        ..Default::default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
