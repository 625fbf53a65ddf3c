//! Turns raw detections into findings: assigns severity from the canonical
//! (confidence, impact) table, deduplicates repeated claims, folds anomaly
//! corroboration into overlapping rule findings, and freezes deterministic
//! identities. This is the only place severity is ever assigned.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::detectors::Detection;
use crate::domain::finding::{Finding, FindingId, LeakageType, Severity};

// ---------------------------------------------------------------------------
// Severity table
// ---------------------------------------------------------------------------

/// The canonical severity contract. A tier is reached either on impact alone
/// or on a confidence floor combined with a lower impact bar; every bound is
/// an inclusive lower bound, which keeps classification monotone in both
/// confidence and impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityTable {
    /// Impact at which a finding is critical outright (default: 10,000).
    pub critical_impact: Decimal,
    /// Confidence floor for the confident-critical path (default: 0.95).
    pub critical_confidence: f64,
    /// Impact bar paired with the critical confidence floor (default: 1,000).
    pub critical_confident_impact: Decimal,
    /// Impact at which a finding is high outright (default: 2,500).
    pub high_impact: Decimal,
    /// Confidence floor for the confident-high path (default: 0.85).
    pub high_confidence: f64,
    /// Impact bar paired with the high confidence floor (default: 500).
    pub high_confident_impact: Decimal,
    /// Impact at which a finding is medium outright (default: 250).
    pub medium_impact: Decimal,
    /// Confidence floor for the confident-medium path (default: 0.70).
    pub medium_confidence: f64,
    /// Impact bar paired with the medium confidence floor (default: 50).
    pub medium_confident_impact: Decimal,
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            critical_impact: Decimal::new(10_000, 0),
            critical_confidence: 0.95,
            critical_confident_impact: Decimal::new(1_000, 0),
            high_impact: Decimal::new(2_500, 0),
            high_confidence: 0.85,
            high_confident_impact: Decimal::new(500, 0),
            medium_impact: Decimal::new(250, 0),
            medium_confidence: 0.70,
            medium_confident_impact: Decimal::new(50, 0),
        }
    }
}

impl SeverityTable {
    pub fn classify(&self, confidence: f64, impact: Decimal) -> Severity {
        if impact >= self.critical_impact
            || (confidence >= self.critical_confidence && impact >= self.critical_confident_impact)
        {
            return Severity::Critical;
        }
        if impact >= self.high_impact
            || (confidence >= self.high_confidence && impact >= self.high_confident_impact)
        {
            return Severity::High;
        }
        if impact >= self.medium_impact
            || (confidence >= self.medium_confidence && impact >= self.medium_confident_impact)
        {
            return Severity::Medium;
        }
        Severity::Low
    }
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FindingAssembler {
    table: SeverityTable,
}

impl FindingAssembler {
    pub fn new(table: SeverityTable) -> Self {
        Self { table }
    }

    /// Collects detections into the run's findings. Ordering of the input
    /// never affects the output: claims are keyed and sorted before freezing.
    pub fn assemble(&self, detections: Vec<Detection>, detected_at: DateTime<Utc>) -> Vec<Finding> {
        let mut kept: BTreeMap<(String, String, LeakageType), Detection> = BTreeMap::new();
        let mut anomalies: Vec<Detection> = Vec::new();

        for detection in detections {
            if detection.leakage_type == LeakageType::StatisticalAnomaly {
                anomalies.push(detection);
                continue;
            }
            upsert_stronger(&mut kept, detection);
        }

        // An anomaly overlapping a rule claim corroborates it: its evidence is
        // folded in (prefixed) and the anomaly stops being a finding of its
        // own. The rule detector's confidence is never overridden.
        for anomaly in anomalies {
            let folded = match kept.iter_mut().find(|((contract, period, _), _)| {
                *contract == anomaly.contract_id.0 && *period == anomaly.period.0
            }) {
                Some((_, target)) => {
                    for (key, value) in &anomaly.evidence {
                        target.evidence.insert(format!("anomaly_{key}"), value.clone());
                    }
                    target.evidence.insert("corroborated_by_anomaly".to_string(), "true".to_string());
                    true
                }
                None => false,
            };
            if !folded {
                upsert_stronger(&mut kept, anomaly);
            }
        }

        let mut findings: Vec<Finding> =
            kept.into_values().map(|detection| self.freeze(detection, detected_at)).collect();
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.estimated_impact.cmp(&a.estimated_impact))
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        findings
    }

    fn freeze(&self, detection: Detection, detected_at: DateTime<Utc>) -> Finding {
        let confidence = detection.confidence.clamp(0.0, 1.0);
        let estimated_impact = detection.estimated_impact.max(Decimal::ZERO);
        let severity = self.table.classify(confidence, estimated_impact);
        let id =
            FindingId::derive(detection.leakage_type, &detection.contract_id, &detection.period);
        Finding {
            id,
            leakage_type: detection.leakage_type,
            customer_id: detection.customer_id,
            contract_id: detection.contract_id,
            period: detection.period,
            severity,
            confidence,
            estimated_impact,
            evidence: detection.evidence,
            description: detection.description,
            detected_at,
        }
    }
}

/// Keeps the stronger of two claims for the same contract, period, and type:
/// higher confidence wins, impact breaks ties.
fn upsert_stronger(
    kept: &mut BTreeMap<(String, String, LeakageType), Detection>,
    detection: Detection,
) {
    let key =
        (detection.contract_id.0.clone(), detection.period.0.clone(), detection.leakage_type);
    match kept.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(detection);
        }
        Entry::Occupied(mut slot) => {
            let incumbent = slot.get();
            let stronger = detection
                .confidence
                .total_cmp(&incumbent.confidence)
                .then(detection.estimated_impact.cmp(&incumbent.estimated_impact))
                .is_gt();
            if stronger {
                slot.insert(detection);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
