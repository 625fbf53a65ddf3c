//! Cohort-level statistical screen for leakage the rules cannot name.
//!
//! Records sharing a rate plan form a cohort; the metric is the billed unit
//! rate (billed amount over usage). The fit is robust (median center, scaled
//! MAD spread) so that a handful of already-leaking records cannot widen the
//! spread and hide their neighbors. Only the under-billing side of the fence
//! is flagged; collecting too much is not leakage.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::detectors::Detection;
use crate::domain::finding::LeakageType;
use crate::domain::record::UnifiedRecord;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySettings {
    /// Robust score beyond which a record is flagged (default: 3.0).
    pub fence_width: f64,
    /// Minimum cohort size before the screen runs at all (default: 10).
    /// Smaller cohorts are skipped, never flagged.
    pub min_cohort_size: usize,
    /// Loss estimates below this floor are discarded as noise (default: 10).
    pub min_impact: Decimal,
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self { fence_width: 3.0, min_cohort_size: 10, min_impact: Decimal::new(10, 0) }
    }
}

// ---------------------------------------------------------------------------
// Cohort statistics
// ---------------------------------------------------------------------------

/// Scales the median absolute deviation to be comparable with a standard
/// deviation under normality.
const MAD_SCALE: f64 = 1.4826;

/// Robust location and spread for one cohort's unit rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    pub center: f64,
    pub spread: f64,
    pub sample_count: usize,
}

impl CohortStats {
    pub fn fit(values: &[f64]) -> Option<Self> {
        let center = median(values)?;
        let deviations: Vec<f64> = values.iter().map(|value| (value - center).abs()).collect();
        let spread = median(&deviations)? * MAD_SCALE;
        Some(Self { center, spread, sample_count: values.len() })
    }

    /// Robust score for a value. Returns 0.0 when the spread has collapsed or
    /// the cohort is below the minimum sample count.
    pub fn robust_score(&self, value: f64, min_samples: usize) -> f64 {
        if self.sample_count < min_samples || self.spread <= f64::EPSILON {
            return 0.0;
        }
        ((value - self.center) / self.spread).abs()
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Batch-scoped screen. Stateless; cohorts are built fresh from the records
/// it is handed.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    settings: AnomalySettings,
}

impl AnomalyDetector {
    pub fn new(settings: AnomalySettings) -> Self {
        Self { settings }
    }

    /// Screens the whole batch and returns zero or more anomaly detections.
    pub fn screen(&self, records: &[&UnifiedRecord]) -> Vec<Detection> {
        let mut cohorts: BTreeMap<String, Vec<(usize, f64)>> = BTreeMap::new();
        for (idx, record) in records.iter().enumerate() {
            if record.usage.quantity <= 0.0 {
                continue;
            }
            let unit_rate = decimal_to_f64(record.billed_amount) / record.usage.quantity;
            if !unit_rate.is_finite() {
                continue;
            }
            cohorts.entry(record.rate_plan.code.clone()).or_default().push((idx, unit_rate));
        }

        let mut detections = Vec::new();
        for (plan_code, members) in cohorts {
            if members.len() < self.settings.min_cohort_size {
                continue;
            }
            let values: Vec<f64> = members.iter().map(|(_, rate)| *rate).collect();
            let Some(stats) = CohortStats::fit(&values) else {
                continue;
            };
            let cohort_size = members.len();
            for (idx, unit_rate) in members {
                let score = stats.robust_score(unit_rate, self.settings.min_cohort_size);
                if score < self.settings.fence_width || unit_rate >= stats.center {
                    continue;
                }
                if let Some(detection) =
                    self.flag(records[idx], &plan_code, cohort_size, &stats, unit_rate, score)
                {
                    detections.push(detection);
                }
            }
        }
        detections
    }

    fn flag(
        &self,
        record: &UnifiedRecord,
        plan_code: &str,
        cohort_size: usize,
        stats: &CohortStats,
        unit_rate: f64,
        score: f64,
    ) -> Option<Detection> {
        let gap = Decimal::try_from(stats.center - unit_rate).ok()?;
        let usage = Decimal::try_from(record.usage.quantity).ok()?;
        let impact = gap.checked_mul(usage)?.round_dp(2);
        if impact < self.settings.min_impact {
            return None;
        }

        let confidence = anomaly_confidence(score, self.settings.fence_width);
        let description = format!(
            "Billed unit rate {unit_rate:.4} sits {score:.1}\u{3c3} below the {plan_code} cohort typical {:.4}",
            stats.center,
        );
        Some(
            Detection::for_record(
                LeakageType::StatisticalAnomaly,
                record,
                confidence,
                impact,
                description,
            )
            .with_evidence("cohort", plan_code)
            .with_evidence("cohort_size", cohort_size.to_string())
            .with_evidence("unit_rate", format!("{unit_rate:.4}"))
            .with_evidence("cohort_typical_rate", format!("{:.4}", stats.center))
            .with_evidence("robust_score", format!("{score:.2}")),
        )
    }
}

/// Confidence grows monotonically with exceedance past the fence and caps at
/// 1.0; a record exactly on the fence maps to roughly 0.76.
fn anomaly_confidence(score: f64, fence: f64) -> f64 {
    sigmoid_transform(2.0 + (score - fence))
}

/// Map a non-negative score into [0, 1] using a sigmoid: 2 / (1 + e^(-x)) - 1.
fn sigmoid_transform(x: f64) -> f64 {
    (2.0 / (1.0 + (-x).exp()) - 1.0).clamp(0.0, 1.0)
}

fn decimal_to_f64(d: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
