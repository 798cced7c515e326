use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierPolicy;
use crate::error::AppError;

/// Process-wide configuration, loaded once at startup from TOML plus `IRS_*` overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IrsSettings {
    pub store: StoreConfig,
    pub intake: IntakeConfig,
    pub remediation: RemediationConfig,
    pub ai: AiConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IntakeConfig {
    /// Admit unmatched alarms as OTHER rather than dropping them.
    pub admit_other: bool,
    /// Start remediation immediately after creation instead of waiting for an operator.
    pub auto_remediate: bool,
    pub default_environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemediationConfig {
    pub target_instance_type: String,
    pub service_name: String,
    pub ssh_user: String,
    pub ssh_identity_file: Option<PathBuf>,
    /// Executable implementing the compute hook protocol (describe/stop/wait-stopped/set-type/start).
    pub compute_hook: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub stop_timeout_secs: u64,
    pub settle_delay_secs: u64,
    pub plan_deadline_secs: u64,
    pub log_tail_lines: u32,
    pub log_tail_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    /// Unset means the deterministic fallback is always used.
    pub ollama_endpoint: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Unset means notifications are logged and recorded as not configured.
    pub webhook_url: Option<String>,
    pub action_base_url: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("incidents.sqlite"),
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            admit_other: false,
            auto_remediate: true,
            default_environment: "production".to_string(),
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            target_instance_type: "m5.large".to_string(),
            service_name: "loadsim".to_string(),
            ssh_user: "ubuntu".to_string(),
            ssh_identity_file: None,
            compute_hook: None,
            connect_timeout_secs: 30,
            stop_timeout_secs: 600,
            settle_delay_secs: 3,
            plan_deadline_secs: 900,
            log_tail_lines: 5,
            log_tail_chars: 500,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            ollama_endpoint: None,
            model: "phi4-mini".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            action_base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

fn config_err(message: impl Into<String>) -> AppError {
    AppError::new("CONFIG_INVALID", message)
}

fn check_url(field: &str, url: &str) -> Result<(), AppError> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(config_err(format!("{field} must be an http(s) URL")).with_details(format!("{field}={url}")));
    }
    Ok(())
}

impl IrsSettings {
    /// Parse TOML text. Missing sections and keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| {
            AppError::new("CONFIG_PARSE_FAILED", "Failed to parse configuration").with_details(e.to_string())
        })
    }

    /// Load from `path` when given (the file must exist), otherwise start from defaults;
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut settings = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    AppError::new("CONFIG_READ_FAILED", "Failed to read configuration file")
                        .with_details(format!("path={}; err={e}", p.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        settings.apply_env(|k| std::env::var(k).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `IRS_*` overrides from the given lookup (injected so tests need no process env).
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("IRS_DB_PATH") {
            self.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("IRS_OLLAMA_ENDPOINT") {
            self.ai.ollama_endpoint = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = get("IRS_OLLAMA_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = get("IRS_NOTIFY_WEBHOOK") {
            self.notify.webhook_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = get("IRS_ACTION_BASE_URL") {
            self.notify.action_base_url = v;
        }
        if let Some(v) = get("IRS_SSH_USER") {
            self.remediation.ssh_user = v;
        }
        if let Some(v) = get("IRS_SERVICE_NAME") {
            self.remediation.service_name = v;
        }
        if let Some(v) = get("IRS_COMPUTE_HOOK") {
            self.remediation.compute_hook = Some(PathBuf::from(v));
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let r = &self.remediation;
        for (field, v) in [
            ("remediation.connect_timeout_secs", r.connect_timeout_secs),
            ("remediation.stop_timeout_secs", r.stop_timeout_secs),
            ("remediation.plan_deadline_secs", r.plan_deadline_secs),
            ("ai.timeout_secs", self.ai.timeout_secs),
            ("notify.timeout_secs", self.notify.timeout_secs),
        ] {
            if v == 0 {
                return Err(config_err(format!("{field} must be greater than 0")));
            }
        }
        if r.service_name.trim().is_empty() {
            return Err(config_err("remediation.service_name must not be empty"));
        }
        if r.target_instance_type.trim().is_empty() {
            return Err(config_err("remediation.target_instance_type must not be empty"));
        }
        if r.log_tail_lines == 0 {
            return Err(config_err("remediation.log_tail_lines must be greater than 0"));
        }
        if let Some(url) = &self.ai.ollama_endpoint {
            check_url("ai.ollama_endpoint", url)?;
        }
        if let Some(url) = &self.notify.webhook_url {
            check_url("notify.webhook_url", url)?;
        }
        check_url("notify.action_base_url", &self.notify.action_base_url)?;
        Ok(())
    }

    pub fn classifier_policy(&self) -> ClassifierPolicy {
        ClassifierPolicy {
            admit_other: self.intake.admit_other,
        }
    }
}

impl RemediationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn plan_deadline(&self) -> Duration {
        Duration::from_secs(self.plan_deadline_secs)
    }
}
