//! Product/service code normalisation.
//!
//! Billing exports identify services with an irregular vocabulary: vendor
//! prefixed codes (`AmazonEC2`), bare codes (`EC2`), reseller-prefixed codes
//! (`OCB…`), pricing-model codes (`ComputeSavingsPlans`) and opaque
//! marketplace product ids. [`CodeNormalizer`] maps all of them onto one
//! canonical name and [`ServiceCategory`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::{debug, warn};

use crate::models::ServiceCategory;

use ServiceCategory::*;

// ── Vocabulary ────────────────────────────────────────────────────────────────

/// Curated canonical map: upper-cased code → (canonical name, category).
/// Every canonical name also appears as a key of its own.
const SERVICE_TABLE: &[(&str, &str, ServiceCategory)] = &[
    // Compute
    ("EC2", "EC2", Compute),
    ("AMAZONEC2", "EC2", Compute),
    ("LIGHTSAIL", "LIGHTSAIL", Compute),
    ("AMAZONLIGHTSAIL", "LIGHTSAIL", Compute),
    ("BATCH", "BATCH", Compute),
    ("AWSBATCH", "BATCH", Compute),
    // Storage
    ("S3", "S3", Storage),
    ("AMAZONS3", "S3", Storage),
    ("GLACIER", "GLACIER", Storage),
    ("AMAZONGLACIER", "GLACIER", Storage),
    ("AMAZONS3GLACIERDEEPARCHIVE", "GLACIER", Storage),
    ("EBS", "EBS", Storage),
    ("AMAZONEBS", "EBS", Storage),
    ("EFS", "EFS", Storage),
    ("AMAZONEFS", "EFS", Storage),
    ("FSX", "FSX", Storage),
    ("AMAZONFSX", "FSX", Storage),
    ("BACKUP", "BACKUP", Storage),
    ("AWSBACKUP", "BACKUP", Storage),
    ("STORAGEGATEWAY", "STORAGEGATEWAY", Storage),
    ("AWSSTORAGEGATEWAY", "STORAGEGATEWAY", Storage),
    // Database
    ("RDS", "RDS", Database),
    ("AMAZONRDS", "RDS", Database),
    ("DYNAMODB", "DYNAMODB", Database),
    ("AMAZONDYNAMODB", "DYNAMODB", Database),
    ("ELASTICACHE", "ELASTICACHE", Database),
    ("AMAZONELASTICACHE", "ELASTICACHE", Database),
    ("DOCDB", "DOCDB", Database),
    ("DOCUMENTDB", "DOCDB", Database),
    ("AMAZONDOCDB", "DOCDB", Database),
    ("NEPTUNE", "NEPTUNE", Database),
    ("AMAZONNEPTUNE", "NEPTUNE", Database),
    // Analytics
    ("REDSHIFT", "REDSHIFT", Analytics),
    ("AMAZONREDSHIFT", "REDSHIFT", Analytics),
    ("ATHENA", "ATHENA", Analytics),
    ("AMAZONATHENA", "ATHENA", Analytics),
    ("GLUE", "GLUE", Analytics),
    ("AWSGLUE", "GLUE", Analytics),
    ("KINESIS", "KINESIS", Analytics),
    ("AMAZONKINESIS", "KINESIS", Analytics),
    ("AMAZONKINESISFIREHOSE", "KINESIS", Analytics),
    ("OPENSEARCH", "OPENSEARCH", Analytics),
    ("AMAZONES", "OPENSEARCH", Analytics),
    ("ES", "OPENSEARCH", Analytics),
    ("EMR", "EMR", Analytics),
    ("ELASTICMAPREDUCE", "EMR", Analytics),
    ("QUICKSIGHT", "QUICKSIGHT", Analytics),
    ("AMAZONQUICKSIGHT", "QUICKSIGHT", Analytics),
    // Serverless
    ("LAMBDA", "LAMBDA", Serverless),
    ("AWSLAMBDA", "LAMBDA", Serverless),
    ("STEPFUNCTIONS", "STEPFUNCTIONS", Serverless),
    ("AWSSTEPFUNCTIONS", "STEPFUNCTIONS", Serverless),
    ("AMAZONSTATES", "STEPFUNCTIONS", Serverless),
    // Containers
    ("ECS", "ECS", Containers),
    ("AMAZONECS", "ECS", Containers),
    ("EKS", "EKS", Containers),
    ("AMAZONEKS", "EKS", Containers),
    ("ECR", "ECR", Containers),
    ("AMAZONECR", "ECR", Containers),
    ("FARGATE", "FARGATE", Containers),
    ("AWSFARGATE", "FARGATE", Containers),
    // Networking
    ("VPC", "VPC", Networking),
    ("AMAZONVPC", "VPC", Networking),
    ("CLOUDFRONT", "CLOUDFRONT", Networking),
    ("AMAZONCLOUDFRONT", "CLOUDFRONT", Networking),
    ("ROUTE53", "ROUTE53", Networking),
    ("AMAZONROUTE53", "ROUTE53", Networking),
    ("ELB", "ELB", Networking),
    ("AWSELB", "ELB", Networking),
    ("ELASTICLOADBALANCING", "ELB", Networking),
    ("APIGATEWAY", "APIGATEWAY", Networking),
    ("AMAZONAPIGATEWAY", "APIGATEWAY", Networking),
    ("DATATRANSFER", "DATATRANSFER", Networking),
    ("AWSDATATRANSFER", "DATATRANSFER", Networking),
    ("DIRECTCONNECT", "DIRECTCONNECT", Networking),
    ("AWSDIRECTCONNECT", "DIRECTCONNECT", Networking),
    ("GLOBALACCELERATOR", "GLOBALACCELERATOR", Networking),
    ("AWSGLOBALACCELERATOR", "GLOBALACCELERATOR", Networking),
    // Messaging
    ("SNS", "SNS", Messaging),
    ("AMAZONSNS", "SNS", Messaging),
    ("SQS", "SQS", Messaging),
    ("AWSQUEUESERVICE", "SQS", Messaging),
    ("MQ", "MQ", Messaging),
    ("AMAZONMQ", "MQ", Messaging),
    ("SES", "SES", Messaging),
    ("AMAZONSES", "SES", Messaging),
    ("EVENTBRIDGE", "EVENTBRIDGE", Messaging),
    ("AWSEVENTS", "EVENTBRIDGE", Messaging),
    // Machine learning
    ("SAGEMAKER", "SAGEMAKER", MachineLearning),
    ("AMAZONSAGEMAKER", "SAGEMAKER", MachineLearning),
    ("BEDROCK", "BEDROCK", MachineLearning),
    ("AMAZONBEDROCK", "BEDROCK", MachineLearning),
    ("REKOGNITION", "REKOGNITION", MachineLearning),
    ("AMAZONREKOGNITION", "REKOGNITION", MachineLearning),
    ("TEXTRACT", "TEXTRACT", MachineLearning),
    ("AMAZONTEXTRACT", "TEXTRACT", MachineLearning),
    // Security
    ("KMS", "KMS", Security),
    ("AWSKMS", "KMS", Security),
    ("SECRETSMANAGER", "SECRETSMANAGER", Security),
    ("AWSSECRETSMANAGER", "SECRETSMANAGER", Security),
    ("GUARDDUTY", "GUARDDUTY", Security),
    ("AMAZONGUARDDUTY", "GUARDDUTY", Security),
    ("WAF", "WAF", Security),
    ("AWSWAF", "WAF", Security),
    ("SHIELD", "SHIELD", Security),
    ("AWSSHIELD", "SHIELD", Security),
    ("SECURITYHUB", "SECURITYHUB", Security),
    ("AWSSECURITYHUB", "SECURITYHUB", Security),
    ("COGNITO", "COGNITO", Security),
    ("AMAZONCOGNITO", "COGNITO", Security),
    // Management
    ("CLOUDWATCH", "CLOUDWATCH", Management),
    ("AMAZONCLOUDWATCH", "CLOUDWATCH", Management),
    ("CLOUDTRAIL", "CLOUDTRAIL", Management),
    ("AWSCLOUDTRAIL", "CLOUDTRAIL", Management),
    ("CONFIG", "CONFIG", Management),
    ("AWSCONFIG", "CONFIG", Management),
    ("SYSTEMSMANAGER", "SYSTEMSMANAGER", Management),
    ("AWSSYSTEMSMANAGER", "SYSTEMSMANAGER", Management),
    ("CLOUDFORMATION", "CLOUDFORMATION", Management),
    ("AWSCLOUDFORMATION", "CLOUDFORMATION", Management),
    ("COSTEXPLORER", "COSTEXPLORER", Management),
    ("AWSCOSTEXPLORER", "COSTEXPLORER", Management),
    // Support / billing
    ("SUPPORT", "SUPPORT", Support),
    ("AWSSUPPORTBUSINESS", "SUPPORT", Support),
    ("AWSSUPPORTENTERPRISE", "SUPPORT", Support),
    ("AWSDEVELOPERSUPPORT", "SUPPORT", Support),
    ("MARKETPLACE", "MARKETPLACE", Marketplace),
    ("TAX", "TAX", Tax),
];

const VENDOR_PREFIXES: &[&str] = &["AMAZON", "AWS"];

const INTERMEDIARY_PREFIX: &str = "OCB";

/// Service-name fragments recognised at the start of an intermediary code,
/// after the intermediary and vendor prefixes are removed.
const INTERMEDIARY_FRAGMENTS: &[(&str, &str)] = &[
    ("EC2", "EC2"),
    ("S3", "S3"),
    ("LAMBDA", "LAMBDA"),
    ("RDS", "RDS"),
    ("DYNAMODB", "DYNAMODB"),
    ("CLOUDFRONT", "CLOUDFRONT"),
    ("CLOUDWATCH", "CLOUDWATCH"),
    ("ELASTICACHE", "ELASTICACHE"),
    ("REDSHIFT", "REDSHIFT"),
    ("ROUTE53", "ROUTE53"),
    ("VPC", "VPC"),
    ("EBS", "EBS"),
    ("EFS", "EFS"),
    ("ECS", "ECS"),
    ("EKS", "EKS"),
    ("ECR", "ECR"),
    ("SNS", "SNS"),
    ("SQS", "SQS"),
    ("KMS", "KMS"),
];

/// Substring heuristics, most specific first. Pricing-model codes
/// (savings plans, reservations) resolve to the service they discount.
const HEURISTIC_FRAGMENTS: &[(&str, &str)] = &[
    ("SAGEMAKERSAVINGSPLANS", "SAGEMAKER"),
    ("SAGEMAKER", "SAGEMAKER"),
    ("ELASTICACHE", "ELASTICACHE"),
    ("REDSHIFT", "REDSHIFT"),
    ("OPENSEARCH", "OPENSEARCH"),
    ("ELASTICSEARCH", "OPENSEARCH"),
    ("DYNAMODB", "DYNAMODB"),
    ("DOCDB", "DOCDB"),
    ("NEPTUNE", "NEPTUNE"),
    ("AURORA", "RDS"),
    ("RDS", "RDS"),
    ("COMPUTESAVINGSPLANS", "EC2"),
    ("EC2INSTANCESAVINGSPLANS", "EC2"),
    ("SAVINGSPLAN", "EC2"),
    ("RESERVEDINSTANCE", "EC2"),
    ("RESERVED", "EC2"),
    ("ELASTIC COMPUTE CLOUD", "EC2"),
    ("SIMPLE STORAGE SERVICE", "S3"),
    ("RELATIONAL DATABASE", "RDS"),
    ("FARGATE", "FARGATE"),
    ("KUBERNETES", "EKS"),
    ("CONTAINER", "ECS"),
    ("LAMBDA", "LAMBDA"),
    ("CLOUDFRONT", "CLOUDFRONT"),
    ("CLOUDWATCH", "CLOUDWATCH"),
    ("LOADBALANC", "ELB"),
    ("DATATRANSFER", "DATATRANSFER"),
    ("DATA TRANSFER", "DATATRANSFER"),
    ("BANDWIDTH", "DATATRANSFER"),
    ("NATGATEWAY", "VPC"),
    ("KINESIS", "KINESIS"),
    ("GLACIER", "GLACIER"),
    ("BACKUP", "BACKUP"),
    ("EC2", "EC2"),
    ("EBS", "EBS"),
    ("S3", "S3"),
    ("SUPPORT", "SUPPORT"),
];

/// Minimum length of an opaque marketplace product code.
const MARKETPLACE_CODE_MIN_LEN: usize = 20;

/// Default bound on the warn-once set.
pub const DEFAULT_UNKNOWN_CODE_CAPACITY: usize = 10_000;

fn service_table() -> &'static HashMap<&'static str, (&'static str, ServiceCategory)> {
    static TABLE: OnceLock<HashMap<&'static str, (&'static str, ServiceCategory)>> =
        OnceLock::new();
    TABLE.get_or_init(|| {
        SERVICE_TABLE
            .iter()
            .map(|&(code, name, category)| (code, (name, category)))
            .collect()
    })
}

// ── Result types ──────────────────────────────────────────────────────────────

/// Which precedence step resolved a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    Direct,
    VendorPrefix,
    Intermediary,
    Hyphen,
    Heuristic,
    Marketplace,
    Unresolved,
}

/// Canonical identity of a raw product/service code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedService {
    pub name: String,
    pub category: ServiceCategory,
    pub source: MatchSource,
}

impl NormalizedService {
    /// `true` for the tax sentinel: such rows are excluded from aggregation.
    pub fn is_tax(&self) -> bool {
        self.category == ServiceCategory::Tax
    }

    pub fn is_resolved(&self) -> bool {
        self.source != MatchSource::Unresolved
    }

    fn from_table(code: &str, source: MatchSource) -> Option<Self> {
        service_table()
            .get(code)
            .map(|&(name, category)| NormalizedService {
                name: name.to_string(),
                category,
                source,
            })
    }
}

// ── UnknownCodeCache ──────────────────────────────────────────────────────────

/// Bounded set of unrecognised codes that have already produced a warning.
#[derive(Debug)]
pub struct UnknownCodeCache {
    capacity: usize,
    seen: HashSet<String>,
    saturated_logged: bool,
}

impl UnknownCodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: HashSet::new(),
            saturated_logged: false,
        }
    }

    /// Returns `true` the first time `code` is offered while there is room.
    /// Once full, no further codes are recorded or warned about.
    pub fn should_warn(&mut self, code: &str) -> bool {
        if self.seen.contains(code) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            if !self.saturated_logged {
                self.saturated_logged = true;
                debug!(
                    capacity = self.capacity,
                    "unknown-code cache full; suppressing further warnings"
                );
            }
            return false;
        }
        self.seen.insert(code.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for UnknownCodeCache {
    fn default() -> Self {
        Self::new(DEFAULT_UNKNOWN_CODE_CAPACITY)
    }
}

// ── CodeNormalizer ────────────────────────────────────────────────────────────

/// Maps raw vendor codes to canonical services.
///
/// Clones share one warn-once cache. Create a fresh normalizer per parse for
/// per-run warnings, or pass the same one to several parses to suppress
/// repeat warnings across them.
#[derive(Debug, Clone)]
pub struct CodeNormalizer {
    warned: Arc<Mutex<UnknownCodeCache>>,
}

impl CodeNormalizer {
    /// A normalizer with its own warn-once cache of the given capacity.
    pub fn new(cache_capacity: usize) -> Self {
        Self::with_cache(Arc::new(Mutex::new(UnknownCodeCache::new(cache_capacity))))
    }

    /// A normalizer reporting into an externally owned cache.
    pub fn with_cache(cache: Arc<Mutex<UnknownCodeCache>>) -> Self {
        Self { warned: cache }
    }

    /// Handle to the warn-once cache.
    pub fn cache(&self) -> Arc<Mutex<UnknownCodeCache>> {
        Arc::clone(&self.warned)
    }

    /// Normalise `code`, logging at most one warning per unrecognised code.
    ///
    /// Precedence (first success wins):
    /// 1. direct table lookup of the upper-cased, trimmed code;
    /// 2. vendor prefix (`AMAZON`, `AWS`) stripped, then lookup;
    /// 3. intermediary prefix (`OCB`) stripped, then lookup and fragment
    ///    prefix inference;
    /// 4. the part before the first hyphen, then lookup;
    /// 5. substring heuristics;
    /// 6. long upper-case alphanumeric codes → marketplace;
    /// 7. unresolved: the original code, category `other`.
    pub fn normalize(&self, code: &str) -> NormalizedService {
        let trimmed = code.trim();
        let upper = trimmed.to_uppercase();

        if let Some(found) = Self::resolve(&upper) {
            return found;
        }

        if !upper.is_empty() && self.should_warn(&upper) {
            warn!(code = %trimmed, "unrecognised product code; keeping it as-is");
        }

        NormalizedService {
            name: trimmed.to_string(),
            category: ServiceCategory::Other,
            source: MatchSource::Unresolved,
        }
    }

    /// Steps 1–6 of [`CodeNormalizer::normalize`]; no logging.
    fn resolve(upper: &str) -> Option<NormalizedService> {
        if upper.is_empty() {
            return None;
        }

        // 1. Direct.
        if let Some(found) = NormalizedService::from_table(upper, MatchSource::Direct) {
            return Some(found);
        }

        // 2. Vendor prefix.
        if let Some(rest) = strip_vendor_prefix(upper) {
            if let Some(found) = NormalizedService::from_table(rest, MatchSource::VendorPrefix) {
                return Some(found);
            }
        }

        // 3. Intermediary prefix.
        if let Some(rest) = upper.strip_prefix(INTERMEDIARY_PREFIX) {
            let rest = rest.trim_start_matches(['-', '_', ' ']);
            if let Some(found) = NormalizedService::from_table(rest, MatchSource::Intermediary) {
                return Some(found);
            }
            let bare = strip_vendor_prefix(rest).unwrap_or(rest);
            if let Some(found) = NormalizedService::from_table(bare, MatchSource::Intermediary) {
                return Some(found);
            }
            if let Some(&(_, canonical)) = INTERMEDIARY_FRAGMENTS
                .iter()
                .find(|(fragment, _)| bare.starts_with(fragment))
            {
                return NormalizedService::from_table(canonical, MatchSource::Intermediary);
            }
        }

        // 4. Hyphenated.
        if let Some((head, _)) = upper.split_once('-') {
            if let Some(found) = NormalizedService::from_table(head.trim(), MatchSource::Hyphen)
            {
                return Some(found);
            }
        }

        // 5. Heuristics.
        if let Some(&(_, canonical)) = HEURISTIC_FRAGMENTS
            .iter()
            .find(|(fragment, _)| upper.contains(fragment))
        {
            return NormalizedService::from_table(canonical, MatchSource::Heuristic);
        }

        // 6. Marketplace product id.
        if upper.len() >= MARKETPLACE_CODE_MIN_LEN
            && upper
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Some(NormalizedService {
                name: "MARKETPLACE".to_string(),
                category: ServiceCategory::Marketplace,
                source: MatchSource::Marketplace,
            });
        }

        None
    }

    fn should_warn(&self, code: &str) -> bool {
        match self.warned.lock() {
            Ok(mut cache) => cache.should_warn(code),
            Err(poisoned) => poisoned.into_inner().should_warn(code),
        }
    }
}

impl Default for CodeNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_UNKNOWN_CODE_CAPACITY)
    }
}

fn strip_vendor_prefix(code: &str) -> Option<&str> {
    VENDOR_PREFIXES
        .iter()
        .find_map(|prefix| code.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
