//! Triage: files surviving findings as investigation tickets. Findings for the
//! same customer and leakage type collapse into one ticket, and an open ticket
//! inside the cooldown window absorbs repeat findings instead of spawning a
//! duplicate.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::currency::format_inr;
use crate::domain::finding::{Finding, FindingId, LeakageType};
use crate::domain::record::CustomerId;
use crate::domain::ticket::{
    Team, Ticket, TicketAction, TicketEvent, TicketId, TicketPriority, TicketStatus,
};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriagePolicy {
    /// Minimum confidence for a finding to reach ticketing (default: 0.7).
    pub confidence_threshold: f64,
    /// Findings below this confidence file one priority tier lower than their
    /// severity would suggest (default: 0.6). Only observable when the gate is
    /// configured below the floor.
    pub confidence_floor: f64,
    /// Age in days under which an open ticket absorbs repeat findings for the
    /// same customer and type (default: 7).
    pub cooldown_days: i64,
    /// Resolution SLA in days for critical tickets (default: 2).
    pub sla_critical_days: i64,
    /// Resolution SLA in days for high tickets (default: 5).
    pub sla_high_days: i64,
    /// Resolution SLA in days for medium tickets (default: 10).
    pub sla_medium_days: i64,
    /// Resolution SLA in days for low tickets (default: 30).
    pub sla_low_days: i64,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            confidence_floor: 0.6,
            cooldown_days: 7,
            sla_critical_days: 2,
            sla_high_days: 5,
            sla_medium_days: 10,
            sla_low_days: 30,
        }
    }
}

impl TriagePolicy {
    pub fn sla_days(&self, priority: TicketPriority) -> i64 {
        match priority {
            TicketPriority::Critical => self.sla_critical_days,
            TicketPriority::High => self.sla_high_days,
            TicketPriority::Medium => self.sla_medium_days,
            TicketPriority::Low => self.sla_low_days,
        }
    }
}

// ---------------------------------------------------------------------------
// Cooldown index
// ---------------------------------------------------------------------------

/// Open-ticket index keyed by customer and leakage type. The caller owns its
/// lifetime: a fresh index scopes merging to a single run, a carried index
/// extends the cooldown across runs. All writes go through one triage pass,
/// so two findings for the same key can never race into two tickets; when a
/// key already holds a ticket, the earliest-created one wins by construction.
#[derive(Debug, Clone, Default)]
pub struct CooldownIndex {
    tickets: HashMap<(CustomerId, LeakageType), Ticket>,
}

impl CooldownIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, customer: &CustomerId, leakage_type: LeakageType) -> Option<&Ticket> {
        self.tickets.get(&(customer.clone(), leakage_type))
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// The open ticket for `key` if it is still inside the cooldown window.
    fn open_within(
        &mut self,
        key: &(CustomerId, LeakageType),
        now: DateTime<Utc>,
        cooldown_days: i64,
    ) -> Option<&mut Ticket> {
        let ticket = self.tickets.get_mut(key)?;
        let fresh = now.signed_duration_since(ticket.created_at) <= Duration::days(cooldown_days);
        if ticket.is_open() && fresh {
            Some(ticket)
        } else {
            None
        }
    }

    /// Most-recent ticket wins the slot; stale or closed tickets fall out of
    /// the index the next time the same key files.
    fn upsert(&mut self, ticket: Ticket) {
        self.tickets.insert((ticket.customer_id.clone(), ticket.leakage_type), ticket);
    }
}

// ---------------------------------------------------------------------------
// Triage engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TriageOutcome {
    /// Tickets created or merged into by this pass, in deterministic order.
    pub tickets: Vec<Ticket>,
    /// Findings that fell below the confidence gate.
    pub suppressed: Vec<FindingId>,
}

#[derive(Debug, Clone, Default)]
pub struct TriageEngine {
    policy: TriagePolicy,
}

impl TriageEngine {
    pub fn new(policy: TriagePolicy) -> Self {
        Self { policy }
    }

    pub fn triage(
        &self,
        findings: &[Finding],
        index: &mut CooldownIndex,
        now: DateTime<Utc>,
    ) -> TriageOutcome {
        let mut groups: BTreeMap<(String, LeakageType), Vec<&Finding>> = BTreeMap::new();
        let mut suppressed = Vec::new();

        for finding in findings {
            if finding.confidence < self.policy.confidence_threshold {
                suppressed.push(finding.id.clone());
                continue;
            }
            groups
                .entry((finding.customer_id.0.clone(), finding.leakage_type))
                .or_default()
                .push(finding);
        }

        let mut tickets = Vec::new();
        for ((customer, leakage_type), mut group) in groups {
            group.sort_by(|a, b| {
                b.severity
                    .cmp(&a.severity)
                    .then_with(|| b.estimated_impact.cmp(&a.estimated_impact))
                    .then_with(|| a.id.0.cmp(&b.id.0))
            });
            let priority = group
                .iter()
                .map(|finding| self.finding_priority(finding))
                .max()
                .unwrap_or(TicketPriority::Low);
            let key = (CustomerId(customer), leakage_type);

            let merged = match index.open_within(&key, now, self.policy.cooldown_days) {
                Some(ticket) => {
                    for finding in &group {
                        ticket.attach_finding(finding, now);
                    }
                    ticket.escalate_priority(priority, now);
                    Some(ticket.clone())
                }
                None => None,
            };

            let ticket = match merged {
                Some(ticket) => ticket,
                None => {
                    let ticket = self.open_ticket(&key.0, leakage_type, &group, priority, now);
                    index.upsert(ticket.clone());
                    ticket
                }
            };
            tickets.push(ticket);
        }

        TriageOutcome { tickets, suppressed }
    }

    /// Severity maps to priority one-for-one, except that a finding below the
    /// confidence floor files one tier lower.
    fn finding_priority(&self, finding: &Finding) -> TicketPriority {
        let base = TicketPriority::from_severity(finding.severity);
        if finding.confidence < self.policy.confidence_floor {
            base.downgraded()
        } else {
            base
        }
    }

    fn open_ticket(
        &self,
        customer: &CustomerId,
        leakage_type: LeakageType,
        group: &[&Finding],
        priority: TicketPriority,
        now: DateTime<Utc>,
    ) -> Ticket {
        // Groups are sorted strongest-first and never empty.
        let lead = group[0];
        let total: Decimal = group.iter().map(|finding| finding.estimated_impact).sum();
        let resolution_due = now.date_naive() + Duration::days(self.policy.sla_days(priority));

        let mut ticket = Ticket {
            id: TicketId::generate(),
            title: format!("{} - {}", leakage_type.label(), customer.0),
            status: TicketStatus::Open,
            priority,
            team: Team::route(leakage_type),
            customer_id: customer.clone(),
            leakage_type,
            finding_ids: Vec::new(),
            investigation_steps: investigation_steps(lead, total),
            business_impact: format!(
                "Estimated {} in uncollected revenue across {} finding(s) for {}.",
                format_inr(total),
                group.len(),
                customer.0
            ),
            resolution_due,
            created_at: now,
            updated_at: now,
            history: vec![TicketEvent {
                at: now,
                action: TicketAction::Created,
                detail: format!("ticket opened for {}", leakage_type.label()),
            }],
        };
        for finding in group {
            ticket.attach_finding(finding, now);
        }
        ticket
    }
}

// ---------------------------------------------------------------------------
// Investigation playbooks
// ---------------------------------------------------------------------------

fn investigation_steps(lead: &Finding, total: Decimal) -> Vec<String> {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    vars.insert("customer_id".to_string(), lead.customer_id.0.clone());
    vars.insert("contract_id".to_string(), lead.contract_id.0.clone());
    vars.insert("period".to_string(), lead.period.0.clone());
    vars.insert("estimated_impact".to_string(), format_inr(total));
    for (key, value) in &lead.evidence {
        vars.entry(key.clone()).or_insert_with(|| value.clone());
    }

    step_templates(lead.leakage_type)
        .iter()
        .map(|template| substitute(template, &vars))
        .collect()
}

fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut output = template.to_string();
    for (key, value) in vars {
        output = output.replace(&format!("{{{{{key}}}}}"), value);
    }
    output
}

fn step_templates(leakage_type: LeakageType) -> &'static [&'static str] {
    match leakage_type {
        LeakageType::MissingCharges => &[
            "Confirm provisioning for {{customer_id}} shows the service active during {{period}}.",
            "Re-price metered usage for contract {{contract_id}} at the contracted rate.",
            "Check the {{period}} billing run logs for skipped or failed invoice lines.",
            "Raise a corrective invoice for the unbilled amount of {{estimated_impact}}.",
        ],
        LeakageType::RateMismatch => &[
            "Compare the applied unit rate with the contracted rate on contract {{contract_id}}.",
            "Review rate-change and promotion history effective during {{period}}.",
            "Check the rating engine configuration for plan updates that missed {{customer_id}}.",
            "Rebill the shortfall of {{estimated_impact}} once the contracted rate is confirmed.",
        ],
        LeakageType::UsageMismatch => &[
            "Re-pull raw meter readings for contract {{contract_id}} covering {{period}}.",
            "Reconcile mediation totals against the billed usage quantity.",
            "Check for dropped or late usage files in the mediation pipeline.",
            "Invoice the unbilled units worth {{estimated_impact}} after reconciliation.",
        ],
        LeakageType::DuplicateEntry => &[
            "List the duplicated invoice lines for {{customer_id}} in {{period}}.",
            "Confirm with billing operations whether a rerun double-posted the charges.",
            "Reverse the duplicate postings and issue a credit of {{estimated_impact}}.",
        ],
        LeakageType::StatisticalAnomaly => &[
            "Review the effective billing rate for {{customer_id}} against its plan cohort.",
            "Rule out contract-specific discounts or credits that explain the gap.",
            "Escalate to the account owner if no pricing agreement covers the deviation.",
        ],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
