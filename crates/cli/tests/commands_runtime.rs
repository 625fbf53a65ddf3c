use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::NaiveDate;
use revguard_cli::commands::{config, demo, detect};
use revguard_core::{
    BillingPeriod, ContractId, CustomerId, MeteredUsage, Provisioning, ProvisioningStatus,
    RatePlan, UnifiedRecord,
};
use rust_decimal::Decimal;
use serde_json::Value;

#[test]
fn demo_reports_injected_leakage() {
    with_env(&[], || {
        let result = demo::run(None, 200, 42, true);
        assert_eq!(result.exit_code, 0, "expected successful demo run");

        let report = parse_payload(&result.output);
        assert!(report["execution_id"].as_str().unwrap_or("").starts_with("EXEC-"));

        let findings = report["findings"].as_array().expect("findings array");
        assert!(!findings.is_empty(), "planted leakage should produce findings");

        let tickets = report["tickets"].as_array().expect("tickets array");
        assert!(!tickets.is_empty(), "high-confidence findings should produce tickets");

        assert_eq!(report["summary"]["total_findings"].as_u64(), Some(findings.len() as u64));
    });
}

#[test]
fn demo_is_deterministic_for_a_seed() {
    with_env(&[], || {
        let first = demo::run(None, 150, 7, true);
        let second = demo::run(None, 150, 7, true);
        assert_eq!(first.exit_code, 0);
        assert_eq!(second.exit_code, 0);

        // Execution ids are timestamped; finding identity is not.
        let first_ids = finding_ids(&parse_payload(&first.output));
        let second_ids = finding_ids(&parse_payload(&second.output));
        assert!(!first_ids.is_empty());
        assert_eq!(first_ids, second_ids);
    });
}

#[test]
fn demo_human_output_lists_sections() {
    with_env(&[], || {
        let result = demo::run(None, 80, 2, false);
        assert_eq!(result.exit_code, 0);

        assert!(result.output.contains("risk tier"));
        assert!(result.output.contains("findings ("));
        assert!(result.output.contains("tickets ("));
    });
}

#[test]
fn detect_reads_a_batch_from_disk() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        let batch = vec![zero_bill_record()];
        fs::write(&path, serde_json::to_string(&batch).expect("serialize batch"))
            .expect("write batch");

        let result = detect::run(None, &path, true);
        assert_eq!(result.exit_code, 0, "expected successful detect run: {}", result.output);

        let report = parse_payload(&result.output);
        let findings = report["findings"].as_array().expect("findings array");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["leakage_type"], "MissingCharges");
        assert_eq!(report["summary"]["records_evaluated"].as_u64(), Some(1));
    });
}

#[test]
fn detect_reports_missing_input_as_io_failure() {
    with_env(&[], || {
        let result = detect::run(None, Path::new("/nonexistent/batch.json"), false);
        assert_eq!(result.exit_code, 3, "expected input io failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "detect");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "input_io");
    });
}

#[test]
fn detect_rejects_malformed_input() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        fs::write(&path, "not a record batch").expect("write file");

        let result = detect::run(None, &path, false);
        assert_eq!(result.exit_code, 4, "expected input parse failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "input_parse");
    });
}

#[test]
fn explicit_config_path_must_exist() {
    with_env(&[], || {
        let missing = Path::new("/nonexistent/revguard.toml");
        let result = demo::run(Some(missing), 10, 1, false);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "demo");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_lists_effective_values_with_sources() {
    with_env(&[], || {
        let output = config::run(None);

        assert!(output.starts_with("effective config"));
        assert!(output.contains("- triage.confidence_threshold = 0.7 (source: default)"));
        assert!(output.contains("- summary.recovery_rate = 0.85 (source: default)"));
        assert!(output.contains("- logging.level = info (source: default)"));
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[("REVGUARD_LOGGING_LEVEL", "debug")], || {
        let output = config::run(None);
        assert!(output.contains("- logging.level = debug (source: env (REVGUARD_LOGGING_LEVEL))"));
    });
}

#[test]
fn config_attributes_file_values() {
    with_env(&[], || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("revguard.toml");
        fs::write(&path, "[triage]\ncooldown_days = 14\n").expect("write config");

        let output = config::run(Some(&path));
        assert!(output.contains("- triage.cooldown_days = 14"));
        assert!(output.contains(&format!("(source: file ({}))", path.display())));
        // Untouched sections still read as defaults.
        assert!(output.contains("- triage.confidence_threshold = 0.7 (source: default)"));
    });
}

fn zero_bill_record() -> UnifiedRecord {
    UnifiedRecord {
        customer_id: CustomerId("CUST-9001".to_string()),
        contract_id: ContractId("CTR-9001".to_string()),
        period: BillingPeriod("2025-06".to_string()),
        service: "broadband".to_string(),
        rate_plan: RatePlan {
            code: "FIBER-100".to_string(),
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
        usage: MeteredUsage { quantity: 1000.0, unit: "GB".to_string() },
        billed_amount: Decimal::ZERO,
        billed_usage: None,
        lines: Vec::new(),
    }
}

fn finding_ids(report: &Value) -> Vec<String> {
    report["findings"]
        .as_array()
        .map(|findings| {
            findings
                .iter()
                .filter_map(|finding| finding["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "REVGUARD_LOGGING_LEVEL",
        "REVGUARD_LOGGING_FORMAT",
        "REVGUARD_LOG_LEVEL",
        "REVGUARD_LOG_FORMAT",
        "REVGUARD_AS_OF_DATE",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
