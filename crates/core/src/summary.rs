//! Executive summary: a pure, read-only aggregate over one run's findings and
//! tickets. Recomputed from scratch every run; nothing here feeds back into
//! detection or triage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::format_inr_compact;
use crate::domain::finding::{Finding, LeakageType, Severity};
use crate::domain::ticket::{Ticket, TicketPriority};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryThresholds {
    /// Batch loss at or above which the run is high risk (default: 50,000).
    pub high_risk_loss: Decimal,
    /// Critical finding count at or above which the run is high risk
    /// (default: 5).
    pub high_risk_critical_findings: usize,
    /// Batch loss at or above which the run is medium risk (default: 10,000).
    pub medium_risk_loss: Decimal,
    /// Critical finding count at or above which the run is medium risk
    /// (default: 1).
    pub medium_risk_critical_findings: usize,
    /// Share of the estimated loss considered realistically recoverable
    /// (default: 0.85).
    pub recovery_rate: Decimal,
    /// Billing periods per quarter for the linear projection (default: 3).
    pub periods_per_quarter: u32,
    /// Billing periods per year for the linear projection (default: 12).
    pub periods_per_year: u32,
}

impl Default for SummaryThresholds {
    fn default() -> Self {
        Self {
            high_risk_loss: Decimal::new(50_000, 0),
            high_risk_critical_findings: 5,
            medium_risk_loss: Decimal::new(10_000, 0),
            medium_risk_critical_findings: 1,
            recovery_rate: Decimal::new(85, 2),
            periods_per_quarter: 3,
            periods_per_year: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub count: usize,
    pub estimated_loss: Decimal,
}

/// Linear projection of the batch loss rate. The formula is fixed: per-period
/// loss is the batch total divided by the number of distinct billing periods
/// in the batch window, scaled by periods per quarter and per year.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossProjection {
    pub periods_in_batch: usize,
    pub per_period_loss: Decimal,
    pub quarterly_loss: Decimal,
    pub annual_loss: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub execution_id: String,
    pub generated_at: DateTime<Utc>,
    pub records_evaluated: usize,
    pub total_findings: usize,
    pub total_tickets: usize,
    pub total_estimated_loss: Decimal,
    pub potential_recovery: Decimal,
    pub average_confidence: f64,
    /// Open tickets at high or critical priority.
    pub high_priority_count: usize,
    pub by_type: BTreeMap<LeakageType, TypeBreakdown>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub top_leakage_type: Option<LeakageType>,
    pub risk_tier: RiskTier,
    pub projection: LossProjection,
}

impl ExecutiveSummary {
    /// One-line narrative for report headers and logs.
    pub fn headline(&self) -> String {
        format!(
            "{} at risk across {} finding(s) and {} ticket(s); projected annual exposure {}; risk tier {}",
            format_inr_compact(self.total_estimated_loss),
            self.total_findings,
            self.total_tickets,
            format_inr_compact(self.projection.annual_loss),
            self.risk_tier,
        )
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExecutiveSummarizer {
    thresholds: SummaryThresholds,
}

impl ExecutiveSummarizer {
    pub fn new(thresholds: SummaryThresholds) -> Self {
        Self { thresholds }
    }

    pub fn summarize(
        &self,
        execution_id: &str,
        records_evaluated: usize,
        periods_in_batch: usize,
        findings: &[Finding],
        tickets: &[Ticket],
        generated_at: DateTime<Utc>,
    ) -> ExecutiveSummary {
        let total_estimated_loss: Decimal =
            findings.iter().map(|finding| finding.estimated_impact).sum();

        let mut by_type: BTreeMap<LeakageType, TypeBreakdown> = BTreeMap::new();
        let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        for finding in findings {
            let slot = by_type
                .entry(finding.leakage_type)
                .or_insert(TypeBreakdown { count: 0, estimated_loss: Decimal::ZERO });
            slot.count += 1;
            slot.estimated_loss += finding.estimated_impact;
            *by_severity.entry(finding.severity).or_insert(0) += 1;
        }

        let mut top_leakage_type: Option<LeakageType> = None;
        let mut top_loss = Decimal::MIN;
        for (leakage_type, breakdown) in &by_type {
            // Strict comparison keeps the first type in enum order on ties.
            if breakdown.estimated_loss > top_loss {
                top_loss = breakdown.estimated_loss;
                top_leakage_type = Some(*leakage_type);
            }
        }

        let average_confidence = if findings.is_empty() {
            0.0
        } else {
            findings.iter().map(|finding| finding.confidence).sum::<f64>()
                / findings.len() as f64
        };

        let critical_count = by_severity.get(&Severity::Critical).copied().unwrap_or(0);
        let high_priority_count = tickets
            .iter()
            .filter(|ticket| ticket.priority >= TicketPriority::High)
            .count();

        let potential_recovery = total_estimated_loss
            .checked_mul(self.thresholds.recovery_rate)
            .unwrap_or(Decimal::MAX)
            .round_dp(2);

        ExecutiveSummary {
            execution_id: execution_id.to_string(),
            generated_at,
            records_evaluated,
            total_findings: findings.len(),
            total_tickets: tickets.len(),
            total_estimated_loss,
            potential_recovery,
            average_confidence,
            high_priority_count,
            by_type,
            by_severity,
            top_leakage_type,
            risk_tier: self.risk_tier(total_estimated_loss, critical_count),
            projection: self.project(total_estimated_loss, periods_in_batch),
        }
    }

    fn risk_tier(&self, total_loss: Decimal, critical_count: usize) -> RiskTier {
        if total_loss >= self.thresholds.high_risk_loss
            || critical_count >= self.thresholds.high_risk_critical_findings
        {
            RiskTier::High
        } else if total_loss >= self.thresholds.medium_risk_loss
            || critical_count >= self.thresholds.medium_risk_critical_findings
        {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    fn project(&self, total_loss: Decimal, periods_in_batch: usize) -> LossProjection {
        let periods = periods_in_batch.max(1);
        let per_period_loss = total_loss
            .checked_div(Decimal::from(periods as u64))
            .unwrap_or(Decimal::ZERO)
            .round_dp(2);
        LossProjection {
            periods_in_batch: periods,
            per_period_loss,
            quarterly_loss: scale(per_period_loss, self.thresholds.periods_per_quarter),
            annual_loss: scale(per_period_loss, self.thresholds.periods_per_year),
        }
    }
}

/// Saturates at the numeric ceiling instead of wrapping.
fn scale(amount: Decimal, periods: u32) -> Decimal {
    amount.checked_mul(Decimal::from(periods)).unwrap_or(Decimal::MAX).round_dp(2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
