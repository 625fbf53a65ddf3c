use std::path::Path;

use revguard_core::LeakageEngine;

use crate::commands::{load_engine_config, render_report, CommandResult};
use crate::fixtures;

pub fn run(config_path: Option<&Path>, records: usize, seed: u64, json: bool) -> CommandResult {
    let config = match load_engine_config("demo", config_path) {
        Ok(config) => config,
        Err(result) => return result,
    };
    crate::init_logging(&config);

    let engine = match LeakageEngine::new(config) {
        Ok(engine) => engine,
        Err(error) => {
            return CommandResult::failure("demo", "config_validation", error.to_string(), 2)
        }
    };

    let batch = fixtures::synthetic_batch(records, seed);
    tracing::info!(
        event_name = "cli.demo.batch_generated",
        records = batch.len(),
        seed,
        "generated synthetic batch"
    );

    let report = engine.detect(&batch);
    tracing::info!(
        event_name = "cli.demo.completed",
        execution_id = %report.execution_id,
        findings = report.findings.len(),
        tickets = report.tickets.len(),
        "demo detection run complete"
    );

    render_report("demo", &report, json)
}
