use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use revguard_core::{EngineConfig, LoadOptions};
use toml::Value;

pub fn run(config_path: Option<&Path>) -> String {
    let options = LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    };
    let config = match EngineConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let mut push = |key: &str, value: &str, env_keys: &[&str]| {
        lines.push(render_line(
            key,
            value,
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    };

    push("rules.rate_mismatch_tolerance", &config.rules.rate_mismatch_tolerance.to_string(), &[]);
    push(
        "rules.usage_variance_threshold",
        &config.rules.usage_variance_threshold.to_string(),
        &[],
    );

    push("anomaly.fence_width", &config.anomaly.fence_width.to_string(), &[]);
    push("anomaly.min_cohort_size", &config.anomaly.min_cohort_size.to_string(), &[]);
    push("anomaly.min_impact", &config.anomaly.min_impact.to_string(), &[]);

    push("severity.critical_impact", &config.severity.critical_impact.to_string(), &[]);
    push("severity.high_impact", &config.severity.high_impact.to_string(), &[]);
    push("severity.medium_impact", &config.severity.medium_impact.to_string(), &[]);

    push("triage.confidence_threshold", &config.triage.confidence_threshold.to_string(), &[]);
    push("triage.cooldown_days", &config.triage.cooldown_days.to_string(), &[]);
    push("triage.sla_critical_days", &config.triage.sla_critical_days.to_string(), &[]);

    push("summary.recovery_rate", &config.summary.recovery_rate.to_string(), &[]);
    push("summary.high_risk_loss", &config.summary.high_risk_loss.to_string(), &[]);

    push(
        "logging.level",
        &config.logging.level,
        &["REVGUARD_LOGGING_LEVEL", "REVGUARD_LOG_LEVEL"],
    );
    push(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["REVGUARD_LOGGING_FORMAT", "REVGUARD_LOG_FORMAT"],
    );

    let as_of = config
        .as_of_date
        .map(|date| date.to_string())
        .unwrap_or_else(|| "<today>".to_string());
    push("as_of_date", &as_of, &["REVGUARD_AS_OF_DATE"]);

    lines.join("\n")
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("revguard.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/revguard.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
