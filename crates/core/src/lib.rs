pub mod assembler;
pub mod audit;
pub mod config;
pub mod currency;
pub mod detectors;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod summary;
pub mod triage;

pub use assembler::{FindingAssembler, SeverityTable};
pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{
    ConfigError, ConfigOverrides, EngineConfig, LoadOptions, LogFormat, LoggingConfig,
};
pub use currency::{format_inr, format_inr_compact};
pub use detectors::anomaly::{AnomalyDetector, AnomalySettings, CohortStats};
pub use detectors::rules::RuleThresholds;
pub use detectors::{Detection, DetectorError, RuleOutcome};
pub use domain::finding::{Finding, FindingId, LeakageType, Severity};
pub use domain::record::{
    BillingLine, BillingPeriod, ContractId, CustomerId, MeteredUsage, Provisioning,
    ProvisioningStatus, RatePlan, RecordValidationError, UnifiedRecord,
};
pub use domain::ticket::{
    Team, Ticket, TicketAction, TicketEvent, TicketId, TicketPriority, TicketStatus,
};
pub use engine::{DetectionReport, Diagnostic, LeakageEngine};
pub use errors::DomainError;
pub use summary::{
    ExecutiveSummarizer, ExecutiveSummary, LossProjection, RiskTier, SummaryThresholds,
    TypeBreakdown,
};
pub use triage::{CooldownIndex, TriageEngine, TriageOutcome, TriagePolicy};
