//! Findings: the engine's statement that specific revenue was not collected.
//! Identity is deterministic so that re-running detection over the same batch
//! reproduces the same finding ids.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::record::{BillingPeriod, ContractId, CustomerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeakageType {
    MissingCharges,
    RateMismatch,
    UsageMismatch,
    DuplicateEntry,
    StatisticalAnomaly,
}

impl LeakageType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCharges => "MC",
            Self::RateMismatch => "RM",
            Self::UsageMismatch => "UM",
            Self::DuplicateEntry => "DE",
            Self::StatisticalAnomaly => "SA",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingCharges => "Missing Charges",
            Self::RateMismatch => "Rate Mismatch",
            Self::UsageMismatch => "Usage Mismatch",
            Self::DuplicateEntry => "Duplicate Entry",
            Self::StatisticalAnomaly => "Statistical Anomaly",
        }
    }
}

impl std::fmt::Display for LeakageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived exclusively from (confidence, impact) by the assembler. Variant
/// order matters: the derived `Ord` ranks `Low < Medium < High < Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FindingId(pub String);

impl FindingId {
    /// Deterministic identity from what the finding asserts, not when it was
    /// observed: the same leak in the same contract-period always maps to the
    /// same id across runs.
    pub fn derive(
        leakage_type: LeakageType,
        contract_id: &ContractId,
        period: &BillingPeriod,
    ) -> Self {
        let canonical = format!("{}|{}|{}", leakage_type.code(), contract_id.0, period.0);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        FindingId(format!("FND-{}-{}", leakage_type.code(), &digest[..12]))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub leakage_type: LeakageType,
    pub customer_id: CustomerId,
    pub contract_id: ContractId,
    pub period: BillingPeriod,
    pub severity: Severity,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
    /// Estimated uncollected revenue, never negative.
    pub estimated_impact: Decimal,
    /// Ordered facts supporting the finding. Keys are stable snake_case names.
    pub evidence: BTreeMap<String, String>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use crate::domain::finding::{FindingId, LeakageType, Severity};
    use crate::domain::record::{BillingPeriod, ContractId};

    #[test]
    fn severity_orders_from_low_to_critical() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn finding_ids_are_stable_across_derivations() {
        let contract = ContractId("CTR-9".to_string());
        let period = BillingPeriod("2025-03".to_string());

        let first = FindingId::derive(LeakageType::RateMismatch, &contract, &period);
        let second = FindingId::derive(LeakageType::RateMismatch, &contract, &period);

        assert_eq!(first, second);
        assert!(first.0.starts_with("FND-RM-"));
    }

    #[test]
    fn finding_ids_separate_by_leakage_type() {
        let contract = ContractId("CTR-9".to_string());
        let period = BillingPeriod("2025-03".to_string());

        let rate = FindingId::derive(LeakageType::RateMismatch, &contract, &period);
        let usage = FindingId::derive(LeakageType::UsageMismatch, &contract, &period);

        assert_ne!(rate, usage);
    }

    #[test]
    fn codes_are_short_and_distinct() {
        let codes = [
            LeakageType::MissingCharges.code(),
            LeakageType::RateMismatch.code(),
            LeakageType::UsageMismatch.code(),
            LeakageType::DuplicateEntry.code(),
            LeakageType::StatisticalAnomaly.code(),
        ];
        let unique: std::collections::BTreeSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
