//! Investigation tickets produced by triage. Status only ever moves forward
//! one step at a time, and every mutation appends to the history log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::finding::{Finding, FindingId, LeakageType, Severity};
use crate::domain::record::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn generate() -> Self {
        TicketId(format!("TKT-{}", Uuid::new_v4()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    /// Adjacent forward steps only. No reopening, no skipping.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Open, TicketStatus::InProgress)
                | (TicketStatus::InProgress, TicketStatus::Resolved)
                | (TicketStatus::Resolved, TicketStatus::Closed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low => Self::Low,
            Severity::Medium => Self::Medium,
            Severity::High => Self::High,
            Severity::Critical => Self::Critical,
        }
    }

    /// One tier down, saturating at `Low`.
    pub fn downgraded(&self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    BillingOperations,
    UsageReconciliation,
    RevenueAssuranceReview,
}

impl Team {
    /// Static routing table by leakage type.
    pub fn route(leakage_type: LeakageType) -> Self {
        match leakage_type {
            LeakageType::MissingCharges
            | LeakageType::RateMismatch
            | LeakageType::DuplicateEntry => Self::BillingOperations,
            LeakageType::UsageMismatch => Self::UsageReconciliation,
            LeakageType::StatisticalAnomaly => Self::RevenueAssuranceReview,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BillingOperations => "Billing Operations",
            Self::UsageReconciliation => "Usage Reconciliation",
            Self::RevenueAssuranceReview => "Revenue Assurance Review",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    Created,
    FindingAttached,
    StatusChanged { from: TicketStatus, to: TicketStatus },
    PriorityEscalated { from: TicketPriority, to: TicketPriority },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub at: DateTime<Utc>,
    pub action: TicketAction,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub team: Team,
    pub customer_id: CustomerId,
    pub leakage_type: LeakageType,
    /// Every ticket traces back to at least one finding.
    pub finding_ids: Vec<FindingId>,
    pub investigation_steps: Vec<String>,
    pub business_impact: String,
    pub resolution_due: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<TicketEvent>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        matches!(self.status, TicketStatus::Open | TicketStatus::InProgress)
    }

    pub fn transition_to(
        &mut self,
        next: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTicketTransition { from: self.status, to: next });
        }

        let from = self.status;
        self.status = next;
        self.updated_at = at;
        self.history.push(TicketEvent {
            at,
            action: TicketAction::StatusChanged { from, to: next },
            detail: format!("status moved from {} to {}", from.as_str(), next.as_str()),
        });
        Ok(())
    }

    /// Appends the finding to the linked set; merging never rewrites what the
    /// ticket already references.
    pub fn attach_finding(&mut self, finding: &Finding, at: DateTime<Utc>) {
        if self.finding_ids.contains(&finding.id) {
            return;
        }
        self.finding_ids.push(finding.id.clone());
        self.updated_at = at;
        self.history.push(TicketEvent {
            at,
            action: TicketAction::FindingAttached,
            detail: format!("attached finding {}", finding.id.0),
        });
    }

    /// Raises the priority when `candidate` outranks the current one. A merge
    /// can escalate a ticket but never quiet it down.
    pub fn escalate_priority(&mut self, candidate: TicketPriority, at: DateTime<Utc>) {
        if candidate <= self.priority {
            return;
        }
        let from = self.priority;
        self.priority = candidate;
        self.updated_at = at;
        self.history.push(TicketEvent {
            at,
            action: TicketAction::PriorityEscalated { from, to: candidate },
            detail: format!("priority escalated from {} to {}", from.as_str(), candidate.as_str()),
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use crate::domain::finding::{Finding, FindingId, LeakageType, Severity};
    use crate::domain::record::{BillingPeriod, ContractId, CustomerId};
    use crate::domain::ticket::{Team, Ticket, TicketId, TicketPriority, TicketStatus};
    use crate::errors::DomainError;

    fn ticket(status: TicketStatus) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: TicketId("TKT-test".to_string()),
            title: "Rate Mismatch - CUST-1".to_string(),
            status,
            priority: TicketPriority::Medium,
            team: Team::BillingOperations,
            customer_id: CustomerId("CUST-1".to_string()),
            leakage_type: LeakageType::RateMismatch,
            finding_ids: vec![FindingId("FND-RM-abc".to_string())],
            investigation_steps: vec!["Pull the rate card".to_string()],
            business_impact: "Recurring under-billing".to_string(),
            resolution_due: NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    fn finding(id: &str) -> Finding {
        Finding {
            id: FindingId(id.to_string()),
            leakage_type: LeakageType::RateMismatch,
            customer_id: CustomerId("CUST-1".to_string()),
            contract_id: ContractId("CTR-1".to_string()),
            period: BillingPeriod("2025-06".to_string()),
            severity: Severity::Medium,
            confidence: 0.8,
            estimated_impact: Decimal::new(12000, 2),
            evidence: BTreeMap::new(),
            description: "billed rate off contract".to_string(),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn full_forward_lifecycle_is_allowed() {
        let mut ticket = ticket(TicketStatus::Open);
        ticket.transition_to(TicketStatus::InProgress, Utc::now()).expect("open -> in_progress");
        ticket.transition_to(TicketStatus::Resolved, Utc::now()).expect("in_progress -> resolved");
        ticket.transition_to(TicketStatus::Closed, Utc::now()).expect("resolved -> closed");

        assert_eq!(ticket.status, TicketStatus::Closed);
        assert_eq!(ticket.history.len(), 3);
    }

    #[test]
    fn skipping_a_step_is_blocked() {
        let mut ticket = ticket(TicketStatus::Open);
        let error = ticket
            .transition_to(TicketStatus::Resolved, Utc::now())
            .expect_err("open -> resolved must fail");
        assert!(matches!(error, DomainError::InvalidTicketTransition { .. }));
    }

    #[test]
    fn moving_backwards_is_blocked() {
        let mut ticket = ticket(TicketStatus::Resolved);
        assert!(ticket.transition_to(TicketStatus::InProgress, Utc::now()).is_err());
    }

    #[test]
    fn closed_is_terminal() {
        let mut ticket = ticket(TicketStatus::Closed);
        assert!(ticket.transition_to(TicketStatus::Open, Utc::now()).is_err());
        assert!(ticket.transition_to(TicketStatus::InProgress, Utc::now()).is_err());
    }

    #[test]
    fn attaching_a_finding_appends_history_once() {
        let mut ticket = ticket(TicketStatus::Open);
        let finding = finding("FND-RM-def");

        ticket.attach_finding(&finding, Utc::now());
        ticket.attach_finding(&finding, Utc::now());

        assert_eq!(ticket.finding_ids.len(), 2);
        assert_eq!(ticket.history.len(), 1);
    }

    #[test]
    fn escalation_only_ever_raises_priority() {
        let mut ticket = ticket(TicketStatus::Open);

        ticket.escalate_priority(TicketPriority::Low, Utc::now());
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert!(ticket.history.is_empty());

        ticket.escalate_priority(TicketPriority::Critical, Utc::now());
        assert_eq!(ticket.priority, TicketPriority::Critical);
        assert_eq!(ticket.history.len(), 1);
    }

    #[test]
    fn routing_table_is_static_by_type() {
        assert_eq!(Team::route(LeakageType::MissingCharges), Team::BillingOperations);
        assert_eq!(Team::route(LeakageType::RateMismatch), Team::BillingOperations);
        assert_eq!(Team::route(LeakageType::DuplicateEntry), Team::BillingOperations);
        assert_eq!(Team::route(LeakageType::UsageMismatch), Team::UsageReconciliation);
        assert_eq!(Team::route(LeakageType::StatisticalAnomaly), Team::RevenueAssuranceReview);
    }

    #[test]
    fn priority_downgrade_saturates_at_low() {
        assert_eq!(TicketPriority::Critical.downgraded(), TicketPriority::High);
        assert_eq!(TicketPriority::Low.downgraded(), TicketPriority::Low);
    }
}
