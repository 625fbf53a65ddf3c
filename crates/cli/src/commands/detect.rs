use std::fs;
use std::path::Path;

use revguard_core::{LeakageEngine, UnifiedRecord};

use crate::commands::{load_engine_config, render_report, CommandResult};

pub fn run(config_path: Option<&Path>, input: &Path, json: bool) -> CommandResult {
    let config = match load_engine_config("detect", config_path) {
        Ok(config) => config,
        Err(result) => return result,
    };
    crate::init_logging(&config);

    let engine = match LeakageEngine::new(config) {
        Ok(engine) => engine,
        Err(error) => {
            return CommandResult::failure("detect", "config_validation", error.to_string(), 2)
        }
    };

    let raw = match fs::read_to_string(input) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "detect",
                "input_io",
                format!("could not read `{}`: {error}", input.display()),
                3,
            )
        }
    };
    let batch: Vec<UnifiedRecord> = match serde_json::from_str(&raw) {
        Ok(batch) => batch,
        Err(error) => {
            return CommandResult::failure(
                "detect",
                "input_parse",
                format!("`{}` is not a unified record batch: {error}", input.display()),
                4,
            )
        }
    };

    tracing::info!(
        event_name = "cli.detect.started",
        records = batch.len(),
        input = %input.display(),
        "starting detection run"
    );
    let report = engine.detect(&batch);
    tracing::info!(
        event_name = "cli.detect.completed",
        execution_id = %report.execution_id,
        findings = report.findings.len(),
        tickets = report.tickets.len(),
        "detection run complete"
    );

    render_report("detect", &report, json)
}
