//! The leakage engine: one synchronous pass over a batch of unified records.
//! Validation, per-record rule detection, the cohort anomaly barrier, finding
//! assembly, ticket triage, and the executive summary run strictly in that
//! order; no stage mutates a predecessor's output.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assembler::FindingAssembler;
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::config::{ConfigError, EngineConfig};
use crate::detectors::anomaly::AnomalyDetector;
use crate::detectors::rules::{
    detect_duplicate_entries, detect_missing_charges, detect_rate_mismatch, detect_usage_mismatch,
};
use crate::detectors::{Detection, DetectorError, RuleOutcome};
use crate::domain::finding::Finding;
use crate::domain::record::UnifiedRecord;
use crate::domain::ticket::Ticket;
use crate::summary::{ExecutiveSummarizer, ExecutiveSummary};
use crate::triage::{CooldownIndex, TriageEngine};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A per-record issue that excluded or degraded processing without aborting
/// the batch. Nothing is ever silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: String,
    pub locator: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub execution_id: String,
    pub findings: Vec<Finding>,
    pub tickets: Vec<Ticket>,
    pub summary: ExecutiveSummary,
    pub diagnostics: Vec<Diagnostic>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct LeakageEngine {
    config: EngineConfig,
    anomaly: AnomalyDetector,
    assembler: FindingAssembler,
    triage: TriageEngine,
    summarizer: ExecutiveSummarizer,
    audit: Option<Arc<dyn AuditSink>>,
}

impl LeakageEngine {
    /// Fails fast on an invalid configuration; nothing is processed until the
    /// thresholds are known to be sane.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            anomaly: AnomalyDetector::new(config.anomaly.clone()),
            assembler: FindingAssembler::new(config.severity.clone()),
            triage: TriageEngine::new(config.triage.clone()),
            summarizer: ExecutiveSummarizer::new(config.summary.clone()),
            audit: None,
            config,
        })
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One-shot detection with a cooldown index scoped to this run.
    pub fn detect(&self, batch: &[UnifiedRecord]) -> DetectionReport {
        let mut index = CooldownIndex::new();
        self.detect_with_index(batch, &mut index)
    }

    /// Detection against a caller-owned cooldown index, letting the
    /// orchestration layer carry open tickets across runs.
    pub fn detect_with_index(
        &self,
        batch: &[UnifiedRecord],
        index: &mut CooldownIndex,
    ) -> DetectionReport {
        let now = Utc::now();
        let as_of = self.config.as_of_date.unwrap_or_else(|| now.date_naive());
        let execution_id = execution_id(now);
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        self.emit(
            AuditEvent::new(
                None,
                execution_id.as_str(),
                "batch_started",
                AuditCategory::System,
                "engine",
                AuditOutcome::Success,
            )
            .with_metadata("records", batch.len().to_string()),
        );

        // Stage 1: validation. Rejected records are excluded from detection
        // but always leave a trace.
        let mut valid: Vec<&UnifiedRecord> = Vec::new();
        for record in batch {
            match record.validate() {
                Ok(()) => valid.push(record),
                Err(error) => {
                    diagnostics.push(Diagnostic {
                        stage: "validation".to_string(),
                        locator: record.locator(),
                        detail: error.to_string(),
                    });
                    self.emit(
                        AuditEvent::new(
                            Some(record.contract_id.clone()),
                            execution_id.as_str(),
                            "record_rejected",
                            AuditCategory::Validation,
                            "validation",
                            AuditOutcome::Failed,
                        )
                        .with_metadata("reason", error.to_string()),
                    );
                }
            }
        }

        // Stage 2: per-record rule detection. A detector failure is isolated
        // to its record and detector; the batch keeps going.
        let mut detections: Vec<Detection> = Vec::new();
        for record in &valid {
            let attempts = [
                detect_missing_charges(record, &self.config.rules, as_of),
                detect_rate_mismatch(record, &self.config.rules, as_of),
                detect_usage_mismatch(record, &self.config.rules, as_of),
            ];
            for attempt in attempts {
                self.collect_outcome(
                    attempt,
                    record,
                    execution_id.as_str(),
                    &mut detections,
                    &mut diagnostics,
                );
            }
        }

        // Duplicate lines are pooled across sibling records of the same
        // contract-period before scanning.
        let mut sibling_groups: BTreeMap<(String, String, String), Vec<&UnifiedRecord>> =
            BTreeMap::new();
        for record in &valid {
            sibling_groups
                .entry((
                    record.customer_id.0.clone(),
                    record.contract_id.0.clone(),
                    record.period.0.clone(),
                ))
                .or_default()
                .push(record);
        }
        for group in sibling_groups.values() {
            let attempt = detect_duplicate_entries(group);
            self.collect_outcome(
                attempt,
                group[0],
                execution_id.as_str(),
                &mut detections,
                &mut diagnostics,
            );
        }
        let rule_count = detections.len();

        // Stage 3: the anomaly barrier needs every cohort member collected
        // before fitting, so it runs once over the whole batch.
        let anomalies = self.anomaly.screen(&valid);
        let anomaly_count = anomalies.len();
        detections.extend(anomalies);

        self.emit(
            AuditEvent::new(
                None,
                execution_id.as_str(),
                "detection_completed",
                AuditCategory::Detection,
                "detectors",
                AuditOutcome::Success,
            )
            .with_metadata("rule_detections", rule_count.to_string())
            .with_metadata("anomaly_detections", anomaly_count.to_string()),
        );

        // Stage 4: assembly freezes severity and deterministic identities.
        let findings = self.assembler.assemble(detections, now);
        self.emit(
            AuditEvent::new(
                None,
                execution_id.as_str(),
                "findings_assembled",
                AuditCategory::Assembly,
                "assembler",
                AuditOutcome::Success,
            )
            .with_metadata("findings", findings.len().to_string()),
        );

        // Stage 5: triage gates on confidence and files tickets.
        let outcome = self.triage.triage(&findings, index, now);
        for finding_id in &outcome.suppressed {
            self.emit(
                AuditEvent::new(
                    None,
                    execution_id.as_str(),
                    "finding_suppressed",
                    AuditCategory::Triage,
                    "triage",
                    AuditOutcome::Skipped,
                )
                .with_metadata("finding_id", finding_id.0.clone()),
            );
        }
        self.emit(
            AuditEvent::new(
                None,
                execution_id.as_str(),
                "tickets_filed",
                AuditCategory::Triage,
                "triage",
                AuditOutcome::Success,
            )
            .with_metadata("tickets", outcome.tickets.len().to_string()),
        );

        // Stage 6: the summary is a snapshot of this run.
        let periods: BTreeSet<&str> =
            valid.iter().map(|record| record.period.0.as_str()).collect();
        let summary = self.summarizer.summarize(
            execution_id.as_str(),
            valid.len(),
            periods.len(),
            &findings,
            &outcome.tickets,
            now,
        );
        self.emit(
            AuditEvent::new(
                None,
                execution_id.as_str(),
                "summary_generated",
                AuditCategory::Summary,
                "summary",
                AuditOutcome::Success,
            )
            .with_metadata("risk_tier", summary.risk_tier.to_string())
            .with_metadata("total_estimated_loss", summary.total_estimated_loss.to_string()),
        );

        DetectionReport {
            execution_id,
            findings,
            tickets: outcome.tickets,
            summary,
            diagnostics,
        }
    }

    fn collect_outcome(
        &self,
        attempt: Result<RuleOutcome, DetectorError>,
        record: &UnifiedRecord,
        execution_id: &str,
        detections: &mut Vec<Detection>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        match attempt {
            Ok(RuleOutcome::Finding(detection)) => detections.push(detection),
            Ok(RuleOutcome::Note(note)) => diagnostics.push(Diagnostic {
                stage: "detection".to_string(),
                locator: record.locator(),
                detail: note,
            }),
            Ok(RuleOutcome::Clear) => {}
            Err(error) => {
                diagnostics.push(Diagnostic {
                    stage: "detection".to_string(),
                    locator: record.locator(),
                    detail: error.to_string(),
                });
                self.emit(
                    AuditEvent::new(
                        Some(record.contract_id.clone()),
                        execution_id,
                        "detector_failed",
                        AuditCategory::Detection,
                        "detectors",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("reason", error.to_string()),
                );
            }
        }
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(sink) = &self.audit {
            sink.emit(event);
        }
    }
}

fn execution_id(now: DateTime<Utc>) -> String {
    format!("EXEC-{}", now.format("%Y%m%d%H%M%S"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::LeakageEngine;
    use crate::audit::InMemoryAuditSink;
    use crate::config::EngineConfig;
    use crate::domain::finding::{LeakageType, Severity};
    use crate::domain::record::{
        BillingPeriod, ContractId, CustomerId, MeteredUsage, Provisioning, ProvisioningStatus,
        RatePlan, UnifiedRecord,
    };
    use crate::domain::ticket::{Team, TicketPriority};

    fn engine() -> LeakageEngine {
        let config = EngineConfig {
            as_of_date: NaiveDate::from_ymd_opt(2025, 7, 15),
            ..EngineConfig::default()
        };
        LeakageEngine::new(config).expect("default config is valid")
    }

    fn record(customer: &str, contract: &str, usage: f64, billed: Decimal) -> UnifiedRecord {
        UnifiedRecord {
            customer_id: CustomerId(customer.to_string()),
            contract_id: ContractId(contract.to_string()),
            period: BillingPeriod("2025-06".to_string()),
            service: "broadband".to_string(),
            rate_plan: RatePlan {
                code: "PLAN-STD".to_string(),
                contracted_rate: Decimal::new(10, 2),
                minimum_charge: None,
                promo_rate: None,
                promo_expires: None,
            },
            contract_start: NaiveDate::from_ymd_opt(2024, 1, 1),
            contract_end: None,
            provisioning: Provisioning {
                status: ProvisioningStatus::Active,
                activated_on: NaiveDate::from_ymd_opt(2024, 1, 5),
            },
            usage: MeteredUsage { quantity: usage, unit: "GB".to_string() },
            billed_amount: billed,
            billed_usage: None,
            lines: Vec::new(),
        }
    }

    #[test]
    fn zero_bill_flows_through_to_a_billing_operations_ticket() {
        let engine = engine();
        let batch = vec![record("CUST-1", "CTR-1", 1000.0, Decimal::ZERO)];

        let report = engine.detect(&batch);

        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.leakage_type, LeakageType::MissingCharges);
        assert_eq!(finding.estimated_impact, Decimal::new(10_000, 2));
        assert!(finding.confidence >= 0.9);
        assert_eq!(finding.severity, Severity::Medium);

        assert_eq!(report.tickets.len(), 1);
        let ticket = &report.tickets[0];
        assert_eq!(ticket.team, Team::BillingOperations);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert_eq!(ticket.finding_ids, vec![finding.id.clone()]);
    }

    #[test]
    fn invalid_records_are_reported_never_silently_dropped() {
        let engine = engine();
        let mut bad = record("CUST-2", "CTR-2", 100.0, Decimal::new(1_000, 2));
        bad.usage.quantity = -5.0;
        let batch = vec![record("CUST-1", "CTR-1", 1000.0, Decimal::ZERO), bad];

        let report = engine.detect(&batch);

        assert_eq!(report.summary.records_evaluated, 1);
        assert_eq!(report.findings.len(), 1);
        let rejected: Vec<_> =
            report.diagnostics.iter().filter(|d| d.stage == "validation").collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].locator, "CUST-2/CTR-2/2025-06");
    }

    #[test]
    fn over_reported_usage_surfaces_as_a_diagnostic_note() {
        let engine = engine();
        let mut suspect = record("CUST-1", "CTR-1", 100.0, Decimal::new(2_000, 2));
        suspect.billed_usage = Some(200.0);

        let report = engine.detect(&[suspect]);

        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.stage == "detection" && d.detail.contains("over-billing")));
        assert!(report
            .findings
            .iter()
            .all(|f| f.leakage_type != LeakageType::UsageMismatch));
    }

    #[test]
    fn rerunning_the_same_batch_reproduces_finding_ids() {
        let engine = engine();
        let batch = vec![
            record("CUST-1", "CTR-1", 1000.0, Decimal::ZERO),
            record("CUST-2", "CTR-2", 500.0, Decimal::ZERO),
        ];

        let first = engine.detect(&batch);
        let second = engine.detect(&batch);

        let first_ids: Vec<_> = first.findings.iter().map(|f| f.id.0.clone()).collect();
        let second_ids: Vec<_> = second.findings.iter().map(|f| f.id.0.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn carried_index_merges_instead_of_duplicating_tickets() {
        let engine = engine();
        let batch = vec![record("CUST-1", "CTR-1", 1000.0, Decimal::ZERO)];
        let mut index = crate::triage::CooldownIndex::new();

        let first = engine.detect_with_index(&batch, &mut index);
        let second = engine.detect_with_index(&batch, &mut index);

        assert_eq!(first.tickets.len(), 1);
        assert_eq!(second.tickets.len(), 1);
        assert_eq!(first.tickets[0].id, second.tickets[0].id);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn audit_sink_records_the_run_lifecycle() {
        let sink = Arc::new(InMemoryAuditSink::default());
        let engine = engine().with_audit_sink(sink.clone());
        let batch = vec![record("CUST-1", "CTR-1", 1000.0, Decimal::ZERO)];

        let report = engine.detect(&batch);

        let events = sink.events();
        assert!(!events.is_empty());
        let types: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"batch_started"));
        assert!(types.contains(&"detection_completed"));
        assert!(types.contains(&"tickets_filed"));
        assert!(types.contains(&"summary_generated"));
        assert!(events.iter().all(|e| e.execution_id == report.execution_id));
    }

    #[test]
    fn empty_batch_produces_an_empty_report() {
        let engine = engine();
        let report = engine.detect(&[]);

        assert!(report.findings.is_empty());
        assert!(report.tickets.is_empty());
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.summary.records_evaluated, 0);
        assert_eq!(report.summary.total_estimated_loss, Decimal::ZERO);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.triage.cooldown_days = -1;

        assert!(LeakageEngine::new(config).is_err());
    }
}
