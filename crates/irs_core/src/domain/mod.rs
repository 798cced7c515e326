use serde::{Deserialize, Serialize};

/// Sentinel stored when an alarm names no resource. Never an error on its own.
pub const UNKNOWN_RESOURCE: &str = "unknown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentType {
    CpuHigh,
    MemHigh,
    AppCrash,
    AppShutdown,
    AppError,
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 6] = [
        IncidentType::CpuHigh,
        IncidentType::MemHigh,
        IncidentType::AppCrash,
        IncidentType::AppShutdown,
        IncidentType::AppError,
        IncidentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::CpuHigh => "CPU_HIGH",
            IncidentType::MemHigh => "MEM_HIGH",
            IncidentType::AppCrash => "APP_CRASH",
            IncidentType::AppShutdown => "APP_SHUTDOWN",
            IncidentType::AppError => "APP_ERROR",
            IncidentType::Other => "OTHER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Human-readable label used in titles and notification bodies.
    pub fn display_name(&self) -> &'static str {
        match self {
            IncidentType::CpuHigh => "High CPU Usage",
            IncidentType::MemHigh => "High Memory Usage",
            IncidentType::AppCrash => "Application Crash",
            IncidentType::AppShutdown => "Service Shutdown",
            IncidentType::AppError => "Application Error",
            IncidentType::Other => "System Alert",
        }
    }

    pub fn is_application(&self) -> bool {
        matches!(
            self,
            IncidentType::AppCrash | IncidentType::AppShutdown | IncidentType::AppError
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Infrastructure,
    Application,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Infrastructure => "infrastructure",
            Category::Application => "application",
            Category::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "infrastructure" => Some(Self::Infrastructure),
            "application" => Some(Self::Application),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Lifecycle states. `Open` is the only initial state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Processing,
    Pending,
    Resolved,
    ManualInterventionRequired,
    Failed,
    Closed,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 7] = [
        IncidentStatus::Open,
        IncidentStatus::Processing,
        IncidentStatus::Pending,
        IncidentStatus::Resolved,
        IncidentStatus::ManualInterventionRequired,
        IncidentStatus::Failed,
        IncidentStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Processing => "processing",
            IncidentStatus::Pending => "pending",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::ManualInterventionRequired => "manual_intervention_required",
            IncidentStatus::Failed => "failed",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// States in which the automated pipeline takes no further action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IncidentStatus::Pending
                | IncidentStatus::Resolved
                | IncidentStatus::ManualInterventionRequired
                | IncidentStatus::Failed
                | IncidentStatus::Closed
        )
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Auto,
    Manual,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Auto => "auto",
            ActionStatus::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Canonical incident record.
///
/// Notes:
/// - `id`, `incident_type`, `category` and `created_at` are write-once.
/// - Timestamps are RFC3339 UTC strings.
/// - `execution_ref` is set exactly while `status == Processing`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub resource_ref: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub category: Category,
    pub status: IncidentStatus,
    pub action_status: ActionStatus,

    pub title: String,
    pub description: String,
    pub environment: String,
    pub reporter: String,
    pub alarm_name: String,
    pub metric_name: Option<String>,
    pub threshold: Option<f64>,
    pub tags: Vec<String>,

    pub report: String,
    pub suggestions: Vec<String>,
    pub action_taken: Option<String>,

    pub email_sent: bool,
    pub email_sent_at: Option<String>,
    pub notification_error: Option<String>,

    pub execution_ref: Option<String>,

    pub created_at: String,
    pub resolved_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl Incident {
    pub fn has_known_resource(&self) -> bool {
        !self.resource_ref.is_empty() && self.resource_ref != UNKNOWN_RESOURCE
    }

    /// Lists every lifecycle invariant this record currently violates.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        let has_exec = self
            .execution_ref
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if (self.status == IncidentStatus::Processing) != has_exec {
            out.push(format!(
                "execution_ref presence ({has_exec}) disagrees with status {}",
                self.status.as_str()
            ));
        }
        if self.status.is_terminal() && self.report.trim().is_empty() {
            out.push(format!(
                "terminal status {} has an empty report",
                self.status.as_str()
            ));
        }
        if self.status.is_resolved() && self.resolved_at.is_none() {
            out.push("resolved incident is missing resolved_at".to_string());
        }
        out
    }
}

/// Partial update applied through `IncidentStore::conditional_update`.
///
/// Double options distinguish "leave alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentPatch {
    pub status: Option<IncidentStatus>,
    pub action_status: Option<ActionStatus>,
    pub severity: Option<Severity>,
    pub report: Option<String>,
    pub suggestions: Option<Vec<String>>,
    pub action_taken: Option<String>,
    pub execution_ref: Option<Option<String>>,
    pub email_sent: Option<bool>,
    pub email_sent_at: Option<Option<String>>,
    pub notification_error: Option<Option<String>>,
    pub resolved_at: Option<String>,
    pub completed_at: Option<String>,
    /// Recorded in the transition log when `status` changes.
    pub reason: Option<String>,
}

impl IncidentPatch {
    pub fn is_empty(&self) -> bool {
        let reason_free = IncidentPatch {
            reason: None,
            ..self.clone()
        };
        reason_free == IncidentPatch::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub incident_id: String,
    pub from_status: IncidentStatus,
    pub to_status: IncidentStatus,
    pub reason: String,
    pub at: String,
}
