//! Deterministic synthetic billing batches with injected leakage.
//!
//! Every defect class the detectors look for is planted at a fixed share of
//! the batch, so a demo run always has something to find. The generator is a
//! pure function of `(records, seed)`.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use revguard_core::{
    BillingLine, BillingPeriod, ContractId, CustomerId, MeteredUsage, Provisioning,
    ProvisioningStatus, RatePlan, UnifiedRecord,
};
use rust_decimal::Decimal;

struct PlanSeed {
    code: &'static str,
    service: &'static str,
    unit: &'static str,
    rate_cents: i64,
    minimum_cents: Option<i64>,
    /// Lapsed promotional rate, applied by the stale-promo injection.
    promo_cents: i64,
}

const PLAN_SEEDS: &[PlanSeed] = &[
    PlanSeed {
        code: "FIBER-100",
        service: "internet",
        unit: "GB",
        rate_cents: 120,
        minimum_cents: Some(2_500),
        promo_cents: 84,
    },
    PlanSeed {
        code: "VOICE-STD",
        service: "phone",
        unit: "min",
        rate_cents: 80,
        minimum_cents: Some(1_500),
        promo_cents: 56,
    },
    PlanSeed {
        code: "TV-PLUS",
        service: "tv",
        unit: "hr",
        rate_cents: 150,
        minimum_cents: None,
        promo_cents: 105,
    },
    PlanSeed {
        code: "CLOUD-STOR",
        service: "cloud",
        unit: "GB",
        rate_cents: 60,
        minimum_cents: Some(1_200),
        promo_cents: 42,
    },
    PlanSeed {
        code: "VPN-SEC",
        service: "vpn",
        unit: "session",
        rate_cents: 35,
        minimum_cents: None,
        promo_cents: 25,
    },
];

// Usage volume scales with customer tier.
const TIERS: &[(&str, f64)] = &[("ENT", 4.0), ("BIZ", 2.0), ("CON", 1.0)];

const PERIODS: &[(&str, u32)] = &[("2025-04", 4), ("2025-05", 5), ("2025-06", 6)];

// Cumulative injection shares, drawn once per record.
const ZERO_BILL_SHARE: f64 = 0.10;
const UNDER_RATE_SHARE: f64 = 0.15;
const USAGE_GAP_SHARE: f64 = 0.23;
const DUPLICATE_SHARE: f64 = 0.27;
const STALE_PROMO_SHARE: f64 = 0.31;
const SUSPENDED_SHARE: f64 = 0.34;

/// Builds `records` synthetic unified records. The same `(records, seed)`
/// pair always yields the same batch.
pub fn synthetic_batch(records: usize, seed: u64) -> Vec<UnifiedRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..records).map(|index| synthetic_record(&mut rng, index)).collect()
}

fn synthetic_record(rng: &mut StdRng, index: usize) -> UnifiedRecord {
    let plan = &PLAN_SEEDS[index % PLAN_SEEDS.len()];
    let (tier, multiplier) = TIERS[index % TIERS.len()];
    let (period, month) = PERIODS[(index / PLAN_SEEDS.len()) % PERIODS.len()];
    let rate = Decimal::new(plan.rate_cents, 2);

    // Base volume keeps even the most under-reported variants above any plan
    // minimum, so minimum-charge findings come only from the zero-bill class.
    let units = (rng.gen_range(100..5_000) as f64 * multiplier) as i64;
    let expected = rate * Decimal::from(units);
    let posted_on = date(2025, month, rng.gen_range(1..28));

    let mut record = UnifiedRecord {
        customer_id: CustomerId(format!("CUST-{tier}-{:04}", index + 1)),
        contract_id: ContractId(format!("CTR-{:04}", index + 1)),
        period: BillingPeriod(period.to_string()),
        service: plan.service.to_string(),
        rate_plan: RatePlan {
            code: plan.code.to_string(),
            contracted_rate: rate,
            minimum_charge: plan.minimum_cents.map(|cents| Decimal::new(cents, 2)),
            promo_rate: None,
            promo_expires: None,
        },
        contract_start: Some(date(2024, 1, 1)),
        contract_end: None,
        provisioning: Provisioning {
            status: ProvisioningStatus::Active,
            activated_on: Some(date(2024, 1, 5)),
        },
        usage: MeteredUsage { quantity: units as f64, unit: plan.unit.to_string() },
        billed_amount: Decimal::ZERO,
        billed_usage: None,
        lines: Vec::new(),
    };

    let roll = rng.gen_range(0.0..1.0_f64);
    if roll < ZERO_BILL_SHARE {
        // Usage metered, nothing invoiced.
        record.billed_amount = Decimal::ZERO;
    } else if roll < UNDER_RATE_SHARE {
        let billed = scale(expected, rng.gen_range(0.5..0.9_f64));
        record.billed_amount = billed;
        push_line(&mut record, index, billed, posted_on);
    } else if roll < USAGE_GAP_SHARE {
        // Billing saw fewer units than the meter did.
        let billed_units = (units as f64 * rng.gen_range(0.3..0.8)).round();
        let billed = (rate * Decimal::from(billed_units as i64)).round_dp(2);
        record.billed_usage = Some(billed_units);
        record.billed_amount = billed;
        push_line(&mut record, index, billed, posted_on);
    } else if roll < DUPLICATE_SHARE {
        // The same charge posted twice.
        record.billed_amount = (expected * Decimal::TWO).round_dp(2);
        push_line(&mut record, index, expected.round_dp(2), posted_on);
        push_line(&mut record, index, expected.round_dp(2), posted_on);
    } else if roll < STALE_PROMO_SHARE {
        // A promo that ended last quarter is still being applied.
        let promo_rate = Decimal::new(plan.promo_cents, 2);
        let billed = (promo_rate * Decimal::from(units)).round_dp(2);
        record.rate_plan.promo_rate = Some(promo_rate);
        record.rate_plan.promo_expires = Some(date(2025, 3, 31));
        record.billed_amount = billed;
        push_line(&mut record, index, billed, posted_on);
    } else {
        if roll < SUSPENDED_SHARE {
            record.provisioning.status = ProvisioningStatus::Suspended;
        }
        // Clean records carry sub-tolerance jitter so cohort spread is
        // realistic rather than exactly zero.
        let billed = scale(expected, rng.gen_range(0.995..1.005_f64));
        record.billed_amount = billed;
        push_line(&mut record, index, billed, posted_on);
    }

    record
}

fn push_line(record: &mut UnifiedRecord, index: usize, amount: Decimal, posted_on: NaiveDate) {
    let line_id = format!("L-{:04}-{}", index + 1, record.lines.len() + 1);
    record.lines.push(BillingLine {
        line_id,
        amount,
        service: record.service.clone(),
        posted_on,
    });
}

fn scale(amount: Decimal, factor: f64) -> Decimal {
    let factor = Decimal::try_from(factor).unwrap_or(Decimal::ONE);
    (amount * factor).round_dp(2)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
