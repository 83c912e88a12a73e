//! Header-row resolution.
//!
//! Maps the ten semantic billing columns onto positional indices using
//! ordered, case-insensitive pattern lists. Only the product-code column is
//! required.

use cur_core::error::{IngestError, Result};

/// Semantic columns the engine reads from a billing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ProductCode,
    ResourceId,
    UsageType,
    Cost,
    InstanceType,
    Os,
    Region,
    UsageAmount,
    UsageStartDate,
    UsageEndDate,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::ProductCode,
        Column::ResourceId,
        Column::UsageType,
        Column::Cost,
        Column::InstanceType,
        Column::Os,
        Column::Region,
        Column::UsageAmount,
        Column::UsageStartDate,
        Column::UsageEndDate,
    ];

    /// Accepted header fragments, highest priority first. Lower-case.
    pub fn patterns(self) -> &'static [&'static str] {
        match self {
            Column::ProductCode => &[
                "lineitem/productcode",
                "product/productcode",
                "product_code",
                "productcode",
                "product/servicecode",
                "servicecode",
                "service_code",
                "service",
            ],
            Column::ResourceId => &[
                "lineitem/resourceid",
                "resource_id",
                "resourceid",
                "resource id",
            ],
            Column::UsageType => &[
                "lineitem/usagetype",
                "usage_type",
                "usagetype",
                "usage type",
            ],
            Column::Cost => &[
                "lineitem/unblendedcost",
                "unblended_cost",
                "unblendedcost",
                "lineitem/blendedcost",
                "blended_cost",
                "blendedcost",
                "lineitem/netunblendedcost",
                "cost",
            ],
            Column::InstanceType => &[
                "product/instancetype",
                "instance_type",
                "instancetype",
                "instance type",
            ],
            Column::Os => &[
                "product/operatingsystem",
                "operating_system",
                "operatingsystem",
                "platform",
            ],
            Column::Region => &[
                "product/regioncode",
                "product/region",
                "region_code",
                "regioncode",
                "region",
                "availabilityzone",
                "availability_zone",
            ],
            Column::UsageAmount => &[
                "lineitem/usageamount",
                "usage_amount",
                "usageamount",
                "usage quantity",
                "quantity",
            ],
            Column::UsageStartDate => &[
                "lineitem/usagestartdate",
                "usage_start_date",
                "usagestartdate",
                "usage start",
                "start_date",
            ],
            Column::UsageEndDate => &[
                "lineitem/usageenddate",
                "usage_end_date",
                "usageenddate",
                "usage end",
                "end_date",
            ],
        }
    }

    /// Name used in error messages and logs.
    pub fn label(self) -> &'static str {
        match self {
            Column::ProductCode => "product/service code",
            Column::ResourceId => "resource id",
            Column::UsageType => "usage type",
            Column::Cost => "cost",
            Column::InstanceType => "instance type",
            Column::Os => "operating system",
            Column::Region => "region",
            Column::UsageAmount => "usage amount",
            Column::UsageStartDate => "usage start date",
            Column::UsageEndDate => "usage end date",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Resolved column positions. Absent columns read as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnIndex {
    slots: [Option<usize>; 10],
}

impl ColumnIndex {
    pub fn get(&self, column: Column) -> Option<usize> {
        self.slots[column.slot()]
    }

    pub fn is_resolved(&self, column: Column) -> bool {
        self.get(column).is_some()
    }

    /// The value of `column` in `row`, or `""` when the column is absent or
    /// the row is short.
    pub fn field<'a>(&self, row: &'a [String], column: Column) -> &'a str {
        self.get(column)
            .and_then(|i| row.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    fn set(&mut self, column: Column, index: usize) {
        self.slots[column.slot()] = Some(index);
    }
}

/// Resolves a tokenized header line into a [`ColumnIndex`].
pub struct HeaderResolver;

impl HeaderResolver {
    pub fn resolve(header: &[String]) -> Result<ColumnIndex> {
        let cells: Vec<String> = header
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let cell = if i == 0 {
                    cell.trim_start_matches('\u{feff}')
                } else {
                    cell.as_str()
                };
                cell.trim().to_lowercase()
            })
            .collect();

        let mut index = ColumnIndex::default();
        for column in Column::ALL {
            if let Some(i) = Self::find(&cells, column.patterns()) {
                index.set(column, i);
            }
        }

        if !index.is_resolved(Column::ProductCode) {
            return Err(IngestError::HeaderResolution {
                column: Column::ProductCode.label().to_string(),
            });
        }

        tracing::debug!(
            columns = Column::ALL.iter().filter(|c| index.is_resolved(**c)).count(),
            "header resolved"
        );
        Ok(index)
    }

    /// First pattern that matches any cell wins. Within one pattern an exact
    /// cell match beats a substring match.
    fn find(cells: &[String], patterns: &[&str]) -> Option<usize> {
        patterns.iter().find_map(|pattern| {
            cells
                .iter()
                .position(|cell| cell == pattern)
                .or_else(|| cells.iter().position(|cell| cell.contains(pattern)))
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    #[test]
    fn test_resolves_cur_export_header() {
        let h = header(&[
            "identity/LineItemId",
            "lineItem/UsageStartDate",
            "lineItem/UsageEndDate",
            "lineItem/ProductCode",
            "lineItem/UsageType",
            "lineItem/ResourceId",
            "lineItem/UsageAmount",
            "lineItem/UnblendedCost",
            "product/instanceType",
            "product/operatingSystem",
            "product/regionCode",
        ]);
        let idx = HeaderResolver::resolve(&h).unwrap();
        assert_eq!(idx.get(Column::ProductCode), Some(3));
        assert_eq!(idx.get(Column::UsageStartDate), Some(1));
        assert_eq!(idx.get(Column::UsageEndDate), Some(2));
        assert_eq!(idx.get(Column::UsageType), Some(4));
        assert_eq!(idx.get(Column::ResourceId), Some(5));
        assert_eq!(idx.get(Column::UsageAmount), Some(6));
        assert_eq!(idx.get(Column::Cost), Some(7));
        assert_eq!(idx.get(Column::InstanceType), Some(8));
        assert_eq!(idx.get(Column::Os), Some(9));
        assert_eq!(idx.get(Column::Region), Some(10));
    }

    #[test]
    fn test_resolves_simple_header() {
        let idx = HeaderResolver::resolve(&header(&["Service", "ResourceId", "Cost"])).unwrap();
        assert_eq!(idx.get(Column::ProductCode), Some(0));
        assert_eq!(idx.get(Column::ResourceId), Some(1));
        assert_eq!(idx.get(Column::Cost), Some(2));
        assert_eq!(idx.get(Column::Region), None);
    }

    #[test]
    fn test_priority_prefers_earlier_pattern() {
        // "blendedcost" appears first, but "unblendedcost" has higher priority.
        let h = header(&["product_code", "BlendedCost", "UnblendedCost"]);
        let idx = HeaderResolver::resolve(&h).unwrap();
        assert_eq!(idx.get(Column::Cost), Some(2));
    }

    #[test]
    fn test_exact_match_beats_substring() {
        let h = header(&["product_code", "instancetypefamily", "instancetype"]);
        let idx = HeaderResolver::resolve(&h).unwrap();
        assert_eq!(idx.get(Column::InstanceType), Some(2));
    }

    #[test]
    fn test_bom_and_whitespace_stripped() {
        let h = header(&["\u{feff}ProductCode ", " cost"]);
        let idx = HeaderResolver::resolve(&h).unwrap();
        assert_eq!(idx.get(Column::ProductCode), Some(0));
        assert_eq!(idx.get(Column::Cost), Some(1));
    }

    #[test]
    fn test_missing_product_column_fails() {
        let err = HeaderResolver::resolve(&header(&["id", "amount", "cost"])).unwrap_err();
        match err {
            IngestError::HeaderResolution { column } => {
                assert_eq!(column, "product/service code");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // ── Field access ──────────────────────────────────────────────────────────

    #[test]
    fn test_field_degrades_for_absent_and_short_rows() {
        let idx = HeaderResolver::resolve(&header(&["service", "region", "cost"])).unwrap();
        let row = header(&["EC2"]);
        assert_eq!(idx.field(&row, Column::ProductCode), "EC2");
        assert_eq!(idx.field(&row, Column::Region), "");
        assert_eq!(idx.field(&row, Column::Os), "");
    }
}
