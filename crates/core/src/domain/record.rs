//! Unified input rows: one record per customer, contract, and billing period,
//! joining contract terms, provisioning state, metered usage, and billing.
//! Records are immutable inputs; detection never mutates them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

/// Billing period label, `YYYY-MM`. Periods are compared as opaque labels;
/// ordering them lexicographically matches chronological order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningStatus {
    Active,
    Suspended,
    Pending,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioning {
    pub status: ProvisioningStatus,
    pub activated_on: Option<NaiveDate>,
}

impl Provisioning {
    pub fn is_active(&self) -> bool {
        self.status == ProvisioningStatus::Active
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatePlan {
    pub code: String,
    /// Contracted per-unit rate.
    pub contracted_rate: Decimal,
    pub minimum_charge: Option<Decimal>,
    /// Promotional per-unit rate, valid until `promo_expires`.
    pub promo_rate: Option<Decimal>,
    pub promo_expires: Option<NaiveDate>,
}

impl RatePlan {
    /// The rate the customer should be billed at on `as_of`: the promotional
    /// rate while it is still in effect, the contracted rate otherwise.
    pub fn active_rate(&self, as_of: NaiveDate) -> Decimal {
        match (self.promo_rate, self.promo_expires) {
            (Some(rate), Some(expiry)) if as_of <= expiry => rate,
            (Some(rate), None) => rate,
            _ => self.contracted_rate,
        }
    }

    pub fn promo_expired(&self, as_of: NaiveDate) -> bool {
        matches!(
            (self.promo_rate, self.promo_expires),
            (Some(_), Some(expiry)) if as_of > expiry
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeteredUsage {
    pub quantity: f64,
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillingLine {
    pub line_id: String,
    pub amount: Decimal,
    pub service: String,
    pub posted_on: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub customer_id: CustomerId,
    pub contract_id: ContractId,
    pub period: BillingPeriod,
    pub service: String,
    pub rate_plan: RatePlan,
    pub contract_start: Option<NaiveDate>,
    pub contract_end: Option<NaiveDate>,
    pub provisioning: Provisioning,
    pub usage: MeteredUsage,
    /// Total billed for the period, including every line item.
    pub billed_amount: Decimal,
    /// The usage figure the billing system itself reported, when it carries one.
    pub billed_usage: Option<f64>,
    pub lines: Vec<BillingLine>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordValidationError {
    #[error("customer id is empty")]
    EmptyCustomerId,
    #[error("contract id is empty")]
    EmptyContractId,
    #[error("billing period is empty")]
    EmptyPeriod,
    #[error("metered usage {0} is negative")]
    NegativeUsage(String),
    #[error("metered usage is not a finite number")]
    NonFiniteUsage,
    #[error("billed usage is negative or not finite")]
    InvalidBilledUsage,
    #[error("billed amount {0} is negative")]
    NegativeBilledAmount(String),
    #[error("contracted rate {0} is negative")]
    NegativeRate(String),
    #[error("billing line {0} has a negative amount")]
    NegativeLineAmount(String),
    #[error("contract end date precedes contract start date")]
    ContractDatesInverted,
}

impl UnifiedRecord {
    /// Human-readable locator used in diagnostics and log lines.
    pub fn locator(&self) -> String {
        format!("{}/{}/{}", self.customer_id.0, self.contract_id.0, self.period.0)
    }

    /// Validates the invariants detection relies on. A failing record is
    /// excluded from the batch and surfaced as a diagnostic, never a panic.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.customer_id.0.trim().is_empty() {
            return Err(RecordValidationError::EmptyCustomerId);
        }
        if self.contract_id.0.trim().is_empty() {
            return Err(RecordValidationError::EmptyContractId);
        }
        if self.period.0.trim().is_empty() {
            return Err(RecordValidationError::EmptyPeriod);
        }
        if !self.usage.quantity.is_finite() {
            return Err(RecordValidationError::NonFiniteUsage);
        }
        if self.usage.quantity < 0.0 {
            return Err(RecordValidationError::NegativeUsage(self.usage.quantity.to_string()));
        }
        if let Some(billed_usage) = self.billed_usage {
            if !billed_usage.is_finite() || billed_usage < 0.0 {
                return Err(RecordValidationError::InvalidBilledUsage);
            }
        }
        if self.billed_amount.is_sign_negative() && !self.billed_amount.is_zero() {
            return Err(RecordValidationError::NegativeBilledAmount(
                self.billed_amount.to_string(),
            ));
        }
        if self.rate_plan.contracted_rate.is_sign_negative()
            && !self.rate_plan.contracted_rate.is_zero()
        {
            return Err(RecordValidationError::NegativeRate(
                self.rate_plan.contracted_rate.to_string(),
            ));
        }
        for line in &self.lines {
            if line.amount.is_sign_negative() && !line.amount.is_zero() {
                return Err(RecordValidationError::NegativeLineAmount(line.line_id.clone()));
            }
        }
        if let (Some(start), Some(end)) = (self.contract_start, self.contract_end) {
            if end < start {
                return Err(RecordValidationError::ContractDatesInverted);
            }
        }
        Ok(())
    }
}
