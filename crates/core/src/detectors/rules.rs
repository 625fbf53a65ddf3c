//! Rule-based leakage detectors.
//!
//! Four deterministic checks per record (or sibling group, for duplicates):
//! missing charges, rate mismatch, usage mismatch, and duplicate billing
//! lines. Each is a pure function returning at most one detection of its
//! type; running one never requires having run another.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::format_inr;
use crate::detectors::{Detection, DetectorError, RuleOutcome};
use crate::domain::finding::LeakageType;
use crate::domain::record::{BillingLine, UnifiedRecord};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Tolerances shared by the rule detectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// Tolerated relative deviation between the applied and contracted
    /// per-unit rate before a mismatch fires (default: 0.01, i.e. ±1%).
    pub rate_mismatch_tolerance: f64,
    /// Tolerated relative gap between metered and billed usage
    /// (default: 0.10).
    pub usage_variance_threshold: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self { rate_mismatch_tolerance: 0.01, usage_variance_threshold: 0.10 }
    }
}

/// Fixed confidence for duplicate billing lines; the signature match is
/// mechanical, so the claim barely depends on context.
const DUPLICATE_CONFIDENCE: f64 = 0.9;

/// Fixed confidence for below-minimum and expired-promo charges.
const CONTRACT_TERM_CONFIDENCE: f64 = 0.9;

// ---------------------------------------------------------------------------
// Missing charges
// ---------------------------------------------------------------------------

/// An active service with real usage that was billed nothing, billed below
/// the contractual minimum, or billed at a promotional rate that has lapsed.
pub fn detect_missing_charges(
    record: &UnifiedRecord,
    thresholds: &RuleThresholds,
    as_of: NaiveDate,
) -> Result<RuleOutcome, DetectorError> {
    if !record.provisioning.is_active() || record.usage.quantity <= 0.0 {
        return Ok(RuleOutcome::Clear);
    }

    let active_rate = record.rate_plan.active_rate(as_of);
    let expected = expected_revenue(record, as_of)?;

    // Zero bill for an active, consuming service.
    if record.billed_amount.is_zero() {
        let confidence = missing_charge_confidence(true, true, true);
        let description = format!(
            "Active {} service consumed {} {} with no billed charges; expected {}",
            record.service,
            record.usage.quantity,
            record.usage.unit,
            format_inr(expected),
        );
        let detection = Detection::for_record(
            LeakageType::MissingCharges,
            record,
            confidence,
            expected,
            description,
        )
        .with_evidence("expected_revenue", expected.to_string())
        .with_evidence("billed_amount", record.billed_amount.to_string())
        .with_evidence("active_rate", active_rate.to_string())
        .with_evidence("usage_quantity", record.usage.quantity.to_string());
        return Ok(RuleOutcome::Finding(detection));
    }

    // Billed below the contractual minimum.
    if let Some(minimum) = record.rate_plan.minimum_charge {
        if record.billed_amount < minimum {
            let impact = (expected - record.billed_amount).round_dp(2);
            let description = format!(
                "Billed {} below the {} contractual minimum for {} service",
                format_inr(record.billed_amount),
                format_inr(minimum),
                record.service,
            );
            let detection = Detection::for_record(
                LeakageType::MissingCharges,
                record,
                CONTRACT_TERM_CONFIDENCE,
                impact,
                description,
            )
            .with_evidence("expected_revenue", expected.to_string())
            .with_evidence("billed_amount", record.billed_amount.to_string())
            .with_evidence("minimum_charge", minimum.to_string())
            .with_evidence("usage_quantity", record.usage.quantity.to_string());
            return Ok(RuleOutcome::Finding(detection));
        }
    }

    // Expired promotional rate still being applied.
    if record.rate_plan.promo_expired(as_of) {
        if let (Some(promo_rate), Some(expired_on)) =
            (record.rate_plan.promo_rate, record.rate_plan.promo_expires)
        {
            if promo_rate < record.rate_plan.contracted_rate {
                let usage = to_decimal(record.usage.quantity)?;
                let promo_implied = promo_rate
                    .checked_mul(usage)
                    .ok_or(DetectorError::Overflow("promotional charge"))?
                    .round_dp(2);
                if !promo_implied.is_zero()
                    && within_tolerance(
                        record.billed_amount,
                        promo_implied,
                        thresholds.rate_mismatch_tolerance,
                    )?
                {
                    let impact = (record.rate_plan.contracted_rate - promo_rate)
                        .checked_mul(usage)
                        .ok_or(DetectorError::Overflow("expired promo impact"))?
                        .round_dp(2);
                    let description = format!(
                        "Promotional rate {} expired on {} but billing still applies it; {} under-collected",
                        promo_rate, expired_on, format_inr(impact),
                    );
                    let detection = Detection::for_record(
                        LeakageType::MissingCharges,
                        record,
                        CONTRACT_TERM_CONFIDENCE,
                        impact,
                        description,
                    )
                    .with_evidence("promo_rate", promo_rate.to_string())
                    .with_evidence("contracted_rate", record.rate_plan.contracted_rate.to_string())
                    .with_evidence("promo_expired_on", expired_on.to_string())
                    .with_evidence("billed_amount", record.billed_amount.to_string());
                    return Ok(RuleOutcome::Finding(detection));
                }
            }
        }
    }

    Ok(RuleOutcome::Clear)
}

fn missing_charge_confidence(active: bool, has_usage: bool, zero_bill: bool) -> f64 {
    let mut confidence: f64 = 0.5;
    if active {
        confidence += 0.2;
    }
    if has_usage {
        confidence += 0.2;
    }
    if zero_bill {
        confidence += 0.3;
    }
    confidence.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Rate mismatch
// ---------------------------------------------------------------------------

/// The effective billed rate (billed amount over usage) deviates from the
/// active contract rate beyond tolerance, in either direction. Over-applied
/// rates still fire but carry zero impact: leakage measures money the
/// business failed to collect, never money it over-collected.
pub fn detect_rate_mismatch(
    record: &UnifiedRecord,
    thresholds: &RuleThresholds,
    as_of: NaiveDate,
) -> Result<RuleOutcome, DetectorError> {
    // Zero bills belong to missing-charge detection.
    if record.usage.quantity <= 0.0 || record.billed_amount <= Decimal::ZERO {
        return Ok(RuleOutcome::Clear);
    }
    let expected_rate = record.rate_plan.active_rate(as_of);
    if expected_rate <= Decimal::ZERO {
        return Ok(RuleOutcome::Clear);
    }

    let usage = to_decimal(record.usage.quantity)?;
    let applied_rate = record
        .billed_amount
        .checked_div(usage)
        .ok_or(DetectorError::Overflow("applied rate"))?;
    let deviation = (expected_rate - applied_rate)
        .abs()
        .checked_div(expected_rate)
        .ok_or(DetectorError::Overflow("rate deviation"))?;
    let tolerance = to_decimal(thresholds.rate_mismatch_tolerance)?;
    if deviation <= tolerance {
        return Ok(RuleOutcome::Clear);
    }

    // A bill still pinned to a lapsed promotional rate is missing-charge
    // territory; reporting it here as well would count the loss twice.
    if record.rate_plan.promo_expired(as_of) {
        if let Some(promo_rate) = record.rate_plan.promo_rate {
            if promo_rate > Decimal::ZERO
                && within_tolerance(applied_rate, promo_rate, thresholds.rate_mismatch_tolerance)?
            {
                return Ok(RuleOutcome::Clear);
            }
        }
    }

    // Likewise, a bill consistent with its own reported usage at the active
    // rate points at the usage figure, not the rate.
    if let Some(billed_usage) = record.billed_usage {
        let reported = to_decimal(billed_usage)?;
        let implied = expected_rate
            .checked_mul(reported)
            .ok_or(DetectorError::Overflow("reported usage charge"))?;
        if !implied.is_zero()
            && within_tolerance(record.billed_amount, implied, thresholds.rate_mismatch_tolerance)?
        {
            return Ok(RuleOutcome::Clear);
        }
    }

    let under_billed = applied_rate < expected_rate;
    let impact = if under_billed {
        expected_rate
            .checked_mul(usage)
            .ok_or(DetectorError::Overflow("rate mismatch impact"))?
            .checked_sub(record.billed_amount)
            .ok_or(DetectorError::Overflow("rate mismatch impact"))?
            .round_dp(2)
    } else {
        Decimal::ZERO
    };

    let deviation_f = decimal_to_f64(deviation);
    let confidence = rate_mismatch_confidence(under_billed, deviation_f);
    let direction = if under_billed { "under_billed" } else { "over_billed" };
    let description = format!(
        "Billed rate {} deviates {:.1}% from contract rate {} ({direction})",
        applied_rate.round_dp(4),
        deviation_f * 100.0,
        expected_rate,
    );
    let detection =
        Detection::for_record(LeakageType::RateMismatch, record, confidence, impact, description)
            .with_evidence("expected_rate", expected_rate.to_string())
            .with_evidence("applied_rate", applied_rate.round_dp(4).to_string())
            .with_evidence("deviation", format!("{deviation_f:.4}"))
            .with_evidence("direction", direction)
            .with_evidence("usage_quantity", record.usage.quantity.to_string());
    Ok(RuleOutcome::Finding(detection))
}

fn rate_mismatch_confidence(under_billed: bool, deviation: f64) -> f64 {
    let mut confidence: f64 = 0.6;
    if under_billed {
        if deviation > 0.10 {
            confidence += 0.2;
        }
        if deviation > 0.25 {
            confidence += 0.1;
        }
    }
    confidence.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Usage mismatch
// ---------------------------------------------------------------------------

/// The billing system's own usage figure disagrees with metered platform
/// usage beyond the variance threshold. Only the under-billed direction is a
/// finding; over-reported usage is surfaced as a note for the over-billing
/// queue instead.
pub fn detect_usage_mismatch(
    record: &UnifiedRecord,
    thresholds: &RuleThresholds,
    as_of: NaiveDate,
) -> Result<RuleOutcome, DetectorError> {
    let Some(billed_usage) = record.billed_usage else {
        return Ok(RuleOutcome::Clear);
    };
    let metered = record.usage.quantity;
    if metered <= 0.0 {
        if billed_usage > 0.0 {
            return Ok(RuleOutcome::Note(format!(
                "billing reports {billed_usage} {} against zero metered usage; over-reported usage is an over-billing concern, not leakage",
                record.usage.unit,
            )));
        }
        return Ok(RuleOutcome::Clear);
    }

    let variance = (metered - billed_usage).abs() / metered;
    if variance <= thresholds.usage_variance_threshold {
        return Ok(RuleOutcome::Clear);
    }
    if billed_usage > metered {
        return Ok(RuleOutcome::Note(format!(
            "billing reports {billed_usage} {} against {metered} metered ({:.0}% over); over-reported usage is an over-billing concern, not leakage",
            record.usage.unit,
            variance * 100.0,
        )));
    }

    let missing_units = to_decimal(metered - billed_usage)?;
    let active_rate = record.rate_plan.active_rate(as_of);
    let impact = active_rate
        .checked_mul(missing_units)
        .ok_or(DetectorError::Overflow("usage mismatch impact"))?
        .round_dp(2);
    let confidence = usage_mismatch_confidence(variance, billed_usage);
    let description = format!(
        "Metered {metered} {} but billing only carried {billed_usage}; {} uncharged",
        record.usage.unit,
        format_inr(impact),
    );
    let detection =
        Detection::for_record(LeakageType::UsageMismatch, record, confidence, impact, description)
            .with_evidence("metered_usage", metered.to_string())
            .with_evidence("billed_usage", billed_usage.to_string())
            .with_evidence("variance", format!("{variance:.4}"))
            .with_evidence("active_rate", active_rate.to_string());
    Ok(RuleOutcome::Finding(detection))
}

fn usage_mismatch_confidence(variance: f64, billed_usage: f64) -> f64 {
    let mut confidence: f64 = 0.6;
    if variance > 0.5 {
        confidence += 0.2;
    }
    if billed_usage == 0.0 {
        confidence += 0.1;
    }
    confidence.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Duplicate entries
// ---------------------------------------------------------------------------

/// Billing lines within one customer/contract/period group that share a
/// transaction signature (amount, service, posted date). Only occurrences
/// beyond the first are counted; one detection covers the whole group.
pub fn detect_duplicate_entries(siblings: &[&UnifiedRecord]) -> Result<RuleOutcome, DetectorError> {
    let Some(first) = siblings.first() else {
        return Ok(RuleOutcome::Clear);
    };

    let mut by_signature: BTreeMap<(Decimal, String, NaiveDate), Vec<&BillingLine>> =
        BTreeMap::new();
    for record in siblings {
        for line in &record.lines {
            by_signature
                .entry((line.amount, line.service.clone(), line.posted_on))
                .or_default()
                .push(line);
        }
    }

    let mut duplicate_ids: Vec<String> = Vec::new();
    let mut services: BTreeSet<String> = BTreeSet::new();
    let mut impact = Decimal::ZERO;
    for ((amount, service, _), lines) in &by_signature {
        if lines.len() < 2 {
            continue;
        }
        let extra = (lines.len() - 1) as i64;
        let extra_amount = amount
            .checked_mul(Decimal::from(extra))
            .ok_or(DetectorError::Overflow("duplicate amount"))?;
        impact =
            impact.checked_add(extra_amount).ok_or(DetectorError::Overflow("duplicate amount"))?;
        duplicate_ids.extend(lines.iter().skip(1).map(|line| line.line_id.clone()));
        services.insert(service.clone());
    }

    if duplicate_ids.is_empty() {
        return Ok(RuleOutcome::Clear);
    }

    let impact = impact.round_dp(2);
    let description = format!(
        "{} duplicated billing lines worth {} in {}",
        duplicate_ids.len(),
        format_inr(impact),
        first.period.0,
    );
    let detection = Detection::for_record(
        LeakageType::DuplicateEntry,
        first,
        DUPLICATE_CONFIDENCE,
        impact,
        description,
    )
    .with_evidence("duplicate_count", duplicate_ids.len().to_string())
    .with_evidence("duplicate_line_ids", duplicate_ids.join(","))
    .with_evidence("services", services.into_iter().collect::<Vec<_>>().join(","));
    Ok(RuleOutcome::Finding(detection))
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Active-rate-implied charge for the record's usage, floored by the plan
/// minimum when one is declared.
fn expected_revenue(record: &UnifiedRecord, as_of: NaiveDate) -> Result<Decimal, DetectorError> {
    let usage = to_decimal(record.usage.quantity)?;
    let implied = record
        .rate_plan
        .active_rate(as_of)
        .checked_mul(usage)
        .ok_or(DetectorError::Overflow("expected revenue"))?
        .round_dp(2);
    Ok(match record.rate_plan.minimum_charge {
        Some(minimum) if implied < minimum => minimum,
        _ => implied,
    })
}

fn within_tolerance(
    actual: Decimal,
    reference: Decimal,
    tolerance: f64,
) -> Result<bool, DetectorError> {
    let tolerance = to_decimal(tolerance)?;
    let deviation = (actual - reference)
        .abs()
        .checked_div(reference.abs())
        .ok_or(DetectorError::Overflow("relative deviation"))?;
    Ok(deviation <= tolerance)
}

fn to_decimal(value: f64) -> Result<Decimal, DetectorError> {
    Decimal::try_from(value).map_err(|_| DetectorError::UnrepresentableAmount(value))
}

fn decimal_to_f64(d: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
