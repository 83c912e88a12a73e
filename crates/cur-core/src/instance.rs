//! Instance-type → (vCPU, memory) resolution.
//!
//! Common sizes come from a table; anything else is estimated from the
//! `family.size` naming convention.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Compute shape of an instance type.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub cpu: u32,
    /// GiB.
    pub memory: f64,
}

impl InstanceSpec {
    const fn new(cpu: u32, memory: f64) -> Self {
        Self { cpu, memory }
    }

    pub fn is_known(&self) -> bool {
        self.cpu > 0
    }
}

// ── Table ─────────────────────────────────────────────────────────────────────

const KNOWN_SPECS: &[(&str, InstanceSpec)] = &[
    ("t2.nano", InstanceSpec::new(1, 0.5)),
    ("t2.micro", InstanceSpec::new(1, 1.0)),
    ("t2.small", InstanceSpec::new(1, 2.0)),
    ("t2.medium", InstanceSpec::new(2, 4.0)),
    ("t2.large", InstanceSpec::new(2, 8.0)),
    ("t2.xlarge", InstanceSpec::new(4, 16.0)),
    ("t2.2xlarge", InstanceSpec::new(8, 32.0)),
    ("t3.nano", InstanceSpec::new(2, 0.5)),
    ("t3.micro", InstanceSpec::new(2, 1.0)),
    ("t3.small", InstanceSpec::new(2, 2.0)),
    ("t3.medium", InstanceSpec::new(2, 4.0)),
    ("t3.large", InstanceSpec::new(2, 8.0)),
    ("t3.xlarge", InstanceSpec::new(4, 16.0)),
    ("t3.2xlarge", InstanceSpec::new(8, 32.0)),
    ("t4g.micro", InstanceSpec::new(2, 1.0)),
    ("t4g.small", InstanceSpec::new(2, 2.0)),
    ("t4g.medium", InstanceSpec::new(2, 4.0)),
    ("m5.large", InstanceSpec::new(2, 8.0)),
    ("m5.xlarge", InstanceSpec::new(4, 16.0)),
    ("m5.2xlarge", InstanceSpec::new(8, 32.0)),
    ("m5.4xlarge", InstanceSpec::new(16, 64.0)),
    ("m6i.large", InstanceSpec::new(2, 8.0)),
    ("m6i.xlarge", InstanceSpec::new(4, 16.0)),
    ("c5.large", InstanceSpec::new(2, 4.0)),
    ("c5.xlarge", InstanceSpec::new(4, 8.0)),
    ("c5.2xlarge", InstanceSpec::new(8, 16.0)),
    ("c6i.large", InstanceSpec::new(2, 4.0)),
    ("r5.large", InstanceSpec::new(2, 16.0)),
    ("r5.xlarge", InstanceSpec::new(4, 32.0)),
    ("r5.2xlarge", InstanceSpec::new(8, 64.0)),
    ("r6g.large", InstanceSpec::new(2, 16.0)),
    ("x1e.xlarge", InstanceSpec::new(4, 122.0)),
    ("p3.2xlarge", InstanceSpec::new(8, 61.0)),
    ("g4dn.xlarge", InstanceSpec::new(4, 16.0)),
];

fn known_specs() -> &'static HashMap<&'static str, InstanceSpec> {
    static TABLE: OnceLock<HashMap<&'static str, InstanceSpec>> = OnceLock::new();
    TABLE.get_or_init(|| KNOWN_SPECS.iter().copied().collect())
}

/// Prefixes of managed-service instance classes (`db.r5.large`).
const SERVICE_PREFIXES: &[&str] = &["db.", "cache.", "search.", "ml."];

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Stateless resolver from instance type strings to [`InstanceSpec`].
pub struct InstanceSpecResolver;

impl InstanceSpecResolver {
    /// Resolve `instance_type`. Returns a zero spec when the string is empty
    /// or does not follow the `family.size` convention.
    pub fn resolve(instance_type: &str) -> InstanceSpec {
        let lower = instance_type.trim().to_lowercase();
        if lower.is_empty() {
            return InstanceSpec::default();
        }

        let bare = SERVICE_PREFIXES
            .iter()
            .find_map(|p| lower.strip_prefix(p))
            .unwrap_or(&lower);

        if let Some(spec) = known_specs().get(bare) {
            return *spec;
        }

        Self::estimate(bare).unwrap_or_default()
    }

    fn estimate(bare: &str) -> Option<InstanceSpec> {
        let (family, size) = bare.split_once('.')?;
        let mut chars = family.chars();
        let class = chars.next()?;

        // t2, t3, t3a, t4g... but not trn1 and friends.
        if class == 't' && chars.next().is_some_and(|c| c.is_ascii_digit()) {
            return burstable(size);
        }

        let cpu = vcpus_for_size(size)?;
        let ratio = match class {
            'c' => 2.0,
            'm' => 4.0,
            'r' | 'z' => 8.0,
            'x' => 16.0,
            _ => 4.0,
        };
        Some(InstanceSpec::new(cpu, f64::from(cpu) * ratio))
    }
}

fn vcpus_for_size(size: &str) -> Option<u32> {
    match size {
        "nano" | "micro" | "small" | "medium" => Some(1),
        "large" => Some(2),
        "xlarge" => Some(4),
        "metal" => Some(96),
        other => {
            let multiplier: u32 = other.strip_suffix("xlarge")?.parse().ok()?;
            multiplier.checked_mul(4)
        }
    }
}

fn burstable(size: &str) -> Option<InstanceSpec> {
    let spec = match size {
        "nano" => InstanceSpec::new(2, 0.5),
        "micro" => InstanceSpec::new(2, 1.0),
        "small" => InstanceSpec::new(2, 2.0),
        "medium" => InstanceSpec::new(2, 4.0),
        "large" => InstanceSpec::new(2, 8.0),
        "xlarge" => InstanceSpec::new(4, 16.0),
        "2xlarge" => InstanceSpec::new(8, 32.0),
        _ => return None,
    };
    Some(spec)
}
