pub mod config;
pub mod demo;
pub mod detect;

use std::path::Path;

use revguard_core::{format_inr, format_inr_compact, DetectionReport, EngineConfig, LoadOptions};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Shared config bootstrap for run-style commands. An explicitly passed path
/// must exist; the default search locations may be absent.
pub(crate) fn load_engine_config(
    command: &str,
    config_path: Option<&Path>,
) -> Result<EngineConfig, CommandResult> {
    EngineConfig::load(LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    })
    .map_err(|error| CommandResult::failure(command, "config_validation", error.to_string(), 2))
}

pub(crate) fn render_report(command: &str, report: &DetectionReport, json: bool) -> CommandResult {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure(command, "serialization", error.to_string(), 5),
        }
    } else {
        CommandResult { exit_code: 0, output: render_human(report) }
    }
}

fn render_human(report: &DetectionReport) -> String {
    let summary = &report.summary;
    let mut lines = vec![format!("execution {}", report.execution_id), summary.headline()];
    lines.push(format!(
        "risk tier {} | potential recovery {} | average confidence {:.2}",
        summary.risk_tier,
        format_inr_compact(summary.potential_recovery),
        summary.average_confidence,
    ));

    lines.push(format!("findings ({}):", report.findings.len()));
    for finding in &report.findings {
        lines.push(format!(
            "- [{}] {} {} {}/{} {}: {} at risk (confidence {:.2})",
            finding.severity,
            finding.id.0,
            finding.leakage_type,
            finding.customer_id.0,
            finding.contract_id.0,
            finding.period.0,
            format_inr(finding.estimated_impact),
            finding.confidence,
        ));
    }

    lines.push(format!("tickets ({}):", report.tickets.len()));
    for ticket in &report.tickets {
        lines.push(format!(
            "- [{}] {} -> {} (due {}, {} finding(s))",
            ticket.priority.as_str(),
            ticket.title,
            ticket.team,
            ticket.resolution_due,
            ticket.finding_ids.len(),
        ));
    }

    if !report.diagnostics.is_empty() {
        lines.push(format!("diagnostics ({}):", report.diagnostics.len()));
        for diagnostic in &report.diagnostics {
            lines.push(format!(
                "- [{}] {}: {}",
                diagnostic.stage, diagnostic.locator, diagnostic.detail
            ));
        }
    }

    lines.join("\n")
}
