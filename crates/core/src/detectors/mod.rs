//! Leakage detectors.
//!
//! Rule detectors are pure functions over a single record (duplicate detection
//! sees the sibling records of one customer/contract/period group). The
//! statistical screen runs after every record has been seen. Detectors emit
//! [`Detection`]s; severity and identity are assigned later by the assembler.

pub mod anomaly;
pub mod rules;

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::finding::LeakageType;
use crate::domain::record::{BillingPeriod, ContractId, CustomerId, UnifiedRecord};

/// A detector's raw claim: what leaked, where, how sure, and how much.
/// Deliberately has no severity and no id; the assembler derives both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub leakage_type: LeakageType,
    pub customer_id: CustomerId,
    pub contract_id: ContractId,
    pub period: BillingPeriod,
    pub confidence: f64,
    pub estimated_impact: Decimal,
    pub evidence: BTreeMap<String, String>,
    pub description: String,
}

impl Detection {
    pub fn for_record(
        leakage_type: LeakageType,
        record: &UnifiedRecord,
        confidence: f64,
        estimated_impact: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            leakage_type,
            customer_id: record.customer_id.clone(),
            contract_id: record.contract_id.clone(),
            period: record.period.clone(),
            confidence,
            estimated_impact,
            evidence: BTreeMap::new(),
            description: description.into(),
        }
    }

    pub fn with_evidence(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.evidence.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one rule detector over one record or sibling group.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleOutcome {
    /// Nothing to report.
    Clear,
    Finding(Detection),
    /// An observation worth a diagnostic but not a leakage finding, such as
    /// billing that over-reports usage.
    Note(String),
}

/// Per-record detector failures. These are isolated: the engine records a
/// diagnostic for the record and the batch continues.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DetectorError {
    #[error("usage quantity {0} cannot be represented as a decimal amount")]
    UnrepresentableAmount(f64),
    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),
}
