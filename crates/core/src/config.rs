use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembler::SeverityTable;
use crate::detectors::anomaly::AnomalySettings;
use crate::detectors::rules::RuleThresholds;
use crate::summary::SummaryThresholds;
use crate::triage::TriagePolicy;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub rules: RuleThresholds,
    pub anomaly: AnomalySettings,
    pub severity: SeverityTable,
    pub triage: TriagePolicy,
    pub summary: SummaryThresholds,
    pub logging: LoggingConfig,
    /// Reference date for promo expiry and contract-term checks. `None` means
    /// the engine uses the current date at run time.
    pub as_of_date: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub as_of_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: RuleThresholds::default(),
            anomaly: AnomalySettings::default(),
            severity: SeverityTable::default(),
            triage: TriagePolicy::default(),
            summary: SummaryThresholds::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            as_of_date: None,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("revguard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(rules) = patch.rules {
            if let Some(rate_mismatch_tolerance) = rules.rate_mismatch_tolerance {
                self.rules.rate_mismatch_tolerance = rate_mismatch_tolerance;
            }
            if let Some(usage_variance_threshold) = rules.usage_variance_threshold {
                self.rules.usage_variance_threshold = usage_variance_threshold;
            }
        }

        if let Some(anomaly) = patch.anomaly {
            if let Some(fence_width) = anomaly.fence_width {
                self.anomaly.fence_width = fence_width;
            }
            if let Some(min_cohort_size) = anomaly.min_cohort_size {
                self.anomaly.min_cohort_size = min_cohort_size;
            }
            if let Some(min_impact) = anomaly.min_impact {
                self.anomaly.min_impact = min_impact;
            }
        }

        if let Some(severity) = patch.severity {
            if let Some(critical_impact) = severity.critical_impact {
                self.severity.critical_impact = critical_impact;
            }
            if let Some(critical_confidence) = severity.critical_confidence {
                self.severity.critical_confidence = critical_confidence;
            }
            if let Some(critical_confident_impact) = severity.critical_confident_impact {
                self.severity.critical_confident_impact = critical_confident_impact;
            }
            if let Some(high_impact) = severity.high_impact {
                self.severity.high_impact = high_impact;
            }
            if let Some(high_confidence) = severity.high_confidence {
                self.severity.high_confidence = high_confidence;
            }
            if let Some(high_confident_impact) = severity.high_confident_impact {
                self.severity.high_confident_impact = high_confident_impact;
            }
            if let Some(medium_impact) = severity.medium_impact {
                self.severity.medium_impact = medium_impact;
            }
            if let Some(medium_confidence) = severity.medium_confidence {
                self.severity.medium_confidence = medium_confidence;
            }
            if let Some(medium_confident_impact) = severity.medium_confident_impact {
                self.severity.medium_confident_impact = medium_confident_impact;
            }
        }

        if let Some(triage) = patch.triage {
            if let Some(confidence_threshold) = triage.confidence_threshold {
                self.triage.confidence_threshold = confidence_threshold;
            }
            if let Some(confidence_floor) = triage.confidence_floor {
                self.triage.confidence_floor = confidence_floor;
            }
            if let Some(cooldown_days) = triage.cooldown_days {
                self.triage.cooldown_days = cooldown_days;
            }
            if let Some(sla_critical_days) = triage.sla_critical_days {
                self.triage.sla_critical_days = sla_critical_days;
            }
            if let Some(sla_high_days) = triage.sla_high_days {
                self.triage.sla_high_days = sla_high_days;
            }
            if let Some(sla_medium_days) = triage.sla_medium_days {
                self.triage.sla_medium_days = sla_medium_days;
            }
            if let Some(sla_low_days) = triage.sla_low_days {
                self.triage.sla_low_days = sla_low_days;
            }
        }

        if let Some(summary) = patch.summary {
            if let Some(high_risk_loss) = summary.high_risk_loss {
                self.summary.high_risk_loss = high_risk_loss;
            }
            if let Some(high_risk_critical_findings) = summary.high_risk_critical_findings {
                self.summary.high_risk_critical_findings = high_risk_critical_findings;
            }
            if let Some(medium_risk_loss) = summary.medium_risk_loss {
                self.summary.medium_risk_loss = medium_risk_loss;
            }
            if let Some(medium_risk_critical_findings) = summary.medium_risk_critical_findings {
                self.summary.medium_risk_critical_findings = medium_risk_critical_findings;
            }
            if let Some(recovery_rate) = summary.recovery_rate {
                self.summary.recovery_rate = recovery_rate;
            }
            if let Some(periods_per_quarter) = summary.periods_per_quarter {
                self.summary.periods_per_quarter = periods_per_quarter;
            }
            if let Some(periods_per_year) = summary.periods_per_year {
                self.summary.periods_per_year = periods_per_year;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(value) = patch.as_of_date {
            self.as_of_date = Some(parse_iso_date("as_of_date", &value)?);
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let log_level =
            read_env("REVGUARD_LOGGING_LEVEL").or_else(|| read_env("REVGUARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }

        let log_format =
            read_env("REVGUARD_LOGGING_FORMAT").or_else(|| read_env("REVGUARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("REVGUARD_AS_OF_DATE") {
            let parsed =
                NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
                    ConfigError::InvalidEnvOverride {
                        key: "REVGUARD_AS_OF_DATE".to_string(),
                        value,
                    }
                })?;
            self.as_of_date = Some(parsed);
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(as_of_date) = overrides.as_of_date {
            self.as_of_date = Some(as_of_date);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_rules(&self.rules)?;
        validate_anomaly(&self.anomaly)?;
        validate_severity(&self.severity)?;
        validate_triage(&self.triage)?;
        validate_summary(&self.summary)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("revguard.toml"), PathBuf::from("config/revguard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn validate_rules(rules: &RuleThresholds) -> Result<(), ConfigError> {
    if !rules.rate_mismatch_tolerance.is_finite()
        || !(0.0..=1.0).contains(&rules.rate_mismatch_tolerance)
    {
        return Err(ConfigError::Validation(
            "rules.rate_mismatch_tolerance must be in range 0.0..=1.0".to_string(),
        ));
    }

    if !rules.usage_variance_threshold.is_finite()
        || !(0.0..=1.0).contains(&rules.usage_variance_threshold)
    {
        return Err(ConfigError::Validation(
            "rules.usage_variance_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_anomaly(anomaly: &AnomalySettings) -> Result<(), ConfigError> {
    if !anomaly.fence_width.is_finite() || anomaly.fence_width <= 0.0 {
        return Err(ConfigError::Validation(
            "anomaly.fence_width must be a positive number".to_string(),
        ));
    }

    if anomaly.min_cohort_size < 2 {
        return Err(ConfigError::Validation(
            "anomaly.min_cohort_size must be at least 2".to_string(),
        ));
    }

    if anomaly.min_impact < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "anomaly.min_impact must not be negative".to_string(),
        ));
    }

    Ok(())
}

fn validate_severity(severity: &SeverityTable) -> Result<(), ConfigError> {
    let confidences = [
        ("severity.critical_confidence", severity.critical_confidence),
        ("severity.high_confidence", severity.high_confidence),
        ("severity.medium_confidence", severity.medium_confidence),
    ];
    for (name, value) in confidences {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{name} must be in range 0.0..=1.0")));
        }
    }

    let impacts = [
        ("severity.critical_impact", severity.critical_impact),
        ("severity.critical_confident_impact", severity.critical_confident_impact),
        ("severity.high_impact", severity.high_impact),
        ("severity.high_confident_impact", severity.high_confident_impact),
        ("severity.medium_impact", severity.medium_impact),
        ("severity.medium_confident_impact", severity.medium_confident_impact),
    ];
    for (name, value) in impacts {
        if value < Decimal::ZERO {
            return Err(ConfigError::Validation(format!("{name} must not be negative")));
        }
    }

    let impact_ladder = severity.critical_impact >= severity.high_impact
        && severity.high_impact >= severity.medium_impact;
    let confident_ladder = severity.critical_confident_impact >= severity.high_confident_impact
        && severity.high_confident_impact >= severity.medium_confident_impact;
    let confidence_ladder = severity.critical_confidence >= severity.high_confidence
        && severity.high_confidence >= severity.medium_confidence;
    if !impact_ladder || !confident_ladder || !confidence_ladder {
        return Err(ConfigError::Validation(
            "severity thresholds must descend from critical to medium".to_string(),
        ));
    }

    Ok(())
}

fn validate_triage(triage: &TriagePolicy) -> Result<(), ConfigError> {
    if !triage.confidence_threshold.is_finite()
        || !(0.0..=1.0).contains(&triage.confidence_threshold)
    {
        return Err(ConfigError::Validation(
            "triage.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if !triage.confidence_floor.is_finite() || !(0.0..=1.0).contains(&triage.confidence_floor) {
        return Err(ConfigError::Validation(
            "triage.confidence_floor must be in range 0.0..=1.0".to_string(),
        ));
    }

    if triage.cooldown_days < 0 {
        return Err(ConfigError::Validation(
            "triage.cooldown_days must not be negative".to_string(),
        ));
    }

    let slas = [
        ("triage.sla_critical_days", triage.sla_critical_days),
        ("triage.sla_high_days", triage.sla_high_days),
        ("triage.sla_medium_days", triage.sla_medium_days),
        ("triage.sla_low_days", triage.sla_low_days),
    ];
    for (name, value) in slas {
        if value <= 0 {
            return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
        }
    }

    let widening = triage.sla_critical_days <= triage.sla_high_days
        && triage.sla_high_days <= triage.sla_medium_days
        && triage.sla_medium_days <= triage.sla_low_days;
    if !widening {
        return Err(ConfigError::Validation(
            "triage SLA days must widen as priority falls".to_string(),
        ));
    }

    Ok(())
}

fn validate_summary(summary: &SummaryThresholds) -> Result<(), ConfigError> {
    if summary.medium_risk_loss < Decimal::ZERO
        || summary.high_risk_loss < summary.medium_risk_loss
    {
        return Err(ConfigError::Validation(
            "summary risk loss thresholds must satisfy 0 <= medium <= high".to_string(),
        ));
    }

    if summary.high_risk_critical_findings < summary.medium_risk_critical_findings {
        return Err(ConfigError::Validation(
            "summary.high_risk_critical_findings must not be below the medium threshold"
                .to_string(),
        ));
    }

    if summary.recovery_rate < Decimal::ZERO || summary.recovery_rate > Decimal::ONE {
        return Err(ConfigError::Validation(
            "summary.recovery_rate must be in range 0..=1".to_string(),
        ));
    }

    if summary.periods_per_quarter == 0 || summary.periods_per_year < summary.periods_per_quarter {
        return Err(ConfigError::Validation(
            "summary projection periods must satisfy 1 <= quarter <= year".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_iso_date(key: &str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ConfigError::Validation(format!("{key} must be an ISO date (YYYY-MM-DD), got `{value}`"))
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    rules: Option<RulesPatch>,
    anomaly: Option<AnomalyPatch>,
    severity: Option<SeverityPatch>,
    triage: Option<TriagePatch>,
    summary: Option<SummaryPatch>,
    logging: Option<LoggingPatch>,
    /// Quoted ISO date string so the same syntax works from TOML and env.
    as_of_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesPatch {
    rate_mismatch_tolerance: Option<f64>,
    usage_variance_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnomalyPatch {
    fence_width: Option<f64>,
    min_cohort_size: Option<usize>,
    min_impact: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct SeverityPatch {
    critical_impact: Option<Decimal>,
    critical_confidence: Option<f64>,
    critical_confident_impact: Option<Decimal>,
    high_impact: Option<Decimal>,
    high_confidence: Option<f64>,
    high_confident_impact: Option<Decimal>,
    medium_impact: Option<Decimal>,
    medium_confidence: Option<f64>,
    medium_confident_impact: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct TriagePatch {
    confidence_threshold: Option<f64>,
    confidence_floor: Option<f64>,
    cooldown_days: Option<i64>,
    sla_critical_days: Option<i64>,
    sla_high_days: Option<i64>,
    sla_medium_days: Option<i64>,
    sla_low_days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryPatch {
    high_risk_loss: Option<Decimal>,
    high_risk_critical_findings: Option<usize>,
    medium_risk_loss: Option<Decimal>,
    medium_risk_critical_findings: Option<usize>,
    recovery_rate: Option<Decimal>,
    periods_per_quarter: Option<u32>,
    periods_per_year: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{ConfigError, ConfigOverrides, EngineConfig, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();

        assert_eq!(config.rules.rate_mismatch_tolerance, 0.01);
        assert_eq!(config.rules.usage_variance_threshold, 0.10);
        assert_eq!(config.anomaly.fence_width, 3.0);
        assert_eq!(config.anomaly.min_cohort_size, 10);
        assert_eq!(config.severity.critical_impact, Decimal::new(10_000, 0));
        assert_eq!(config.triage.confidence_threshold, 0.7);
        assert_eq!(config.triage.cooldown_days, 7);
        assert_eq!(config.summary.recovery_rate, Decimal::new(85, 2));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.as_of_date, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_patch_overrides_only_named_fields() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["REVGUARD_LOG_LEVEL", "REVGUARD_LOG_FORMAT", "REVGUARD_AS_OF_DATE"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("revguard.toml");
        fs::write(
            &path,
            r#"
as_of_date = "2025-07-15"

[rules]
rate_mismatch_tolerance = 0.02

[triage]
cooldown_days = 3

[logging]
level = "warn"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            EngineConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.rules.rate_mismatch_tolerance == 0.02, "patched tolerance should apply")?;
        ensure(
            config.rules.usage_variance_threshold == 0.10,
            "unpatched variance threshold should keep its default",
        )?;
        ensure(config.triage.cooldown_days == 3, "patched cooldown should apply")?;
        ensure(config.logging.level == "warn", "patched log level should apply")?;
        ensure(
            config.as_of_date == NaiveDate::from_ymd_opt(2025, 7, 15),
            "as_of_date should parse from the quoted ISO string",
        )
    }

    #[test]
    fn env_overrides_win_over_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVGUARD_LOG_LEVEL", "debug");
        env::set_var("REVGUARD_LOG_FORMAT", "json");
        env::set_var("REVGUARD_AS_OF_DATE", "2025-06-30");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("revguard.toml");
            fs::write(
                &path,
                r#"
[logging]
level = "warn"
format = "pretty"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = EngineConfig::load(LoadOptions {
                config_path: Some(path),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "debug", "env log level should win over the file")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "env log format should win over the file",
            )?;
            ensure(
                config.as_of_date == NaiveDate::from_ymd_opt(2025, 6, 30),
                "env as-of date should apply",
            )?;
            Ok(())
        })();

        clear_vars(&["REVGUARD_LOG_LEVEL", "REVGUARD_LOG_FORMAT", "REVGUARD_AS_OF_DATE"]);
        result
    }

    #[test]
    fn explicit_overrides_win_over_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVGUARD_LOG_LEVEL", "debug");
        env::set_var("REVGUARD_AS_OF_DATE", "2025-06-30");

        let result = (|| -> Result<(), String> {
            let config = EngineConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    log_level: Some("error".to_string()),
                    as_of_date: NaiveDate::from_ymd_opt(2025, 1, 1),
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "error", "explicit log level should win over env")?;
            ensure(
                config.as_of_date == NaiveDate::from_ymd_opt(2025, 1, 1),
                "explicit as-of date should win over env",
            )?;
            Ok(())
        })();

        clear_vars(&["REVGUARD_LOG_LEVEL", "REVGUARD_AS_OF_DATE"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = EngineConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/revguard.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn negative_cooldown_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["REVGUARD_LOG_LEVEL", "REVGUARD_LOG_FORMAT", "REVGUARD_AS_OF_DATE"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("revguard.toml");
        fs::write(&path, "[triage]\ncooldown_days = -1\n").map_err(|err| err.to_string())?;

        let error = match EngineConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure on negative cooldown".to_string()),
            Err(error) => error,
        };
        let mentions_cooldown = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("cooldown")
        );
        ensure(mentions_cooldown, "validation failure should mention cooldown")
    }

    #[test]
    fn inverted_severity_ladder_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["REVGUARD_LOG_LEVEL", "REVGUARD_LOG_FORMAT", "REVGUARD_AS_OF_DATE"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("revguard.toml");
        fs::write(&path, "[severity]\nmedium_impact = 99999\n").map_err(|err| err.to_string())?;

        let error = match EngineConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure on inverted ladder".to_string()),
            Err(error) => error,
        };
        let mentions_severity = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("severity")
        );
        ensure(mentions_severity, "validation failure should mention severity thresholds")
    }

    #[test]
    fn malformed_env_date_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVGUARD_AS_OF_DATE", "July 15th");

        let result = (|| -> Result<(), String> {
            let error = match EngineConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. }
                    if key == "REVGUARD_AS_OF_DATE"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["REVGUARD_AS_OF_DATE"]);
        result
    }

    #[test]
    fn unknown_log_level_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("REVGUARD_LOG_LEVEL", "loud");

        let result = (|| -> Result<(), String> {
            let error = match EngineConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected validation failure on log level".to_string()),
                Err(error) => error,
            };
            let mentions_level = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("logging.level")
            );
            ensure(mentions_level, "validation failure should mention logging.level")
        })();

        clear_vars(&["REVGUARD_LOG_LEVEL"]);
        result
    }
}
