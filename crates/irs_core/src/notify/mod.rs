//! Notification rendering and emission.
//!
//! Publishing never fails the transition that triggered it: the emitter records the outcome
//! onto the incident's audit fields and hands back a `Delivery` for the caller to log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::now_rfc3339_utc;
use crate::domain::{Incident, IncidentPatch, IncidentStatus};
use crate::error::AppError;
use crate::store::IncidentStore;

pub const NOTIFY_NOT_CONFIGURED: &str = "NOTIFY_NOT_CONFIGURED";

const RULE: &str = "----------------------------------------";

/// Outbound notification channel.
pub trait Notifier {
    /// Returns the channel's message id.
    fn publish(
        &self,
        subject: &str,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// New incident awaiting or undergoing handling; carries the action links while open.
    IncidentAlert,
    ManualInterventionRequired,
    Resolved,
    RemediationAborted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::IncidentAlert => "incident_alert",
            NotificationKind::ManualInterventionRequired => "manual_intervention_required",
            NotificationKind::Resolved => "resolved",
            NotificationKind::RemediationAborted => "remediation_aborted",
        }
    }

    /// `None` for `processing`: nothing to tell subscribers until the plan finishes.
    pub fn for_status(status: IncidentStatus) -> Option<Self> {
        match status {
            IncidentStatus::Open => Some(NotificationKind::IncidentAlert),
            IncidentStatus::Processing => None,
            IncidentStatus::Pending | IncidentStatus::ManualInterventionRequired => {
                Some(NotificationKind::ManualInterventionRequired)
            }
            IncidentStatus::Resolved | IncidentStatus::Closed => Some(NotificationKind::Resolved),
            IncidentStatus::Failed => Some(NotificationKind::RemediationAborted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedNotification {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

pub fn action_link(base_url: &str, incident_id: &str, action: &str) -> String {
    format!(
        "{}/action?id={incident_id}&action={action}",
        base_url.trim_end_matches('/')
    )
}

fn section(out: &mut Vec<String>, title: &str) {
    out.push(String::new());
    out.push(RULE.to_string());
    out.push(title.to_string());
    out.push(RULE.to_string());
    out.push(String::new());
}

pub fn render(incident: &Incident, kind: NotificationKind, action_base_url: &str) -> RenderedNotification {
    let sev = incident.severity.as_str().to_ascii_uppercase();
    let subject = match kind {
        NotificationKind::IncidentAlert => format!(
            "[{sev}] {} - {}",
            incident.title,
            incident.environment.to_ascii_uppercase()
        ),
        NotificationKind::ManualInterventionRequired => {
            format!("[{sev}] Manual Intervention Required - Incident {}", incident.id)
        }
        NotificationKind::Resolved => format!("[{sev}] Resolved - {}", incident.title),
        NotificationKind::RemediationAborted => {
            format!("[{sev}] Remediation Aborted - Incident {}", incident.id)
        }
    };

    let headline = match kind {
        NotificationKind::IncidentAlert => format!("INCIDENT ALERT: {}", incident.title),
        NotificationKind::ManualInterventionRequired => format!(
            "INCIDENT ALERT: Auto-resolution did not complete for incident {}",
            incident.id
        ),
        NotificationKind::Resolved => format!("INCIDENT RESOLVED: {}", incident.title),
        NotificationKind::RemediationAborted => {
            format!("INCIDENT ALERT: Remediation aborted for incident {}", incident.id)
        }
    };

    let mut lines = vec![headline];

    section(&mut lines, "INCIDENT DETAILS");
    lines.push(format!("- Incident ID: {}", incident.id));
    lines.push(format!("- Type: {}", incident.incident_type.display_name()));
    lines.push(format!("- Severity: {sev}"));
    lines.push(format!("- Environment: {}", incident.environment.to_ascii_uppercase()));
    lines.push(format!("- Resource: {}", incident.resource_ref));
    lines.push(format!("- Status: {}", incident.status.as_str().to_ascii_uppercase()));
    lines.push(format!(
        "- Action Status: {}",
        incident.action_status.as_str().to_ascii_uppercase()
    ));
    lines.push(format!("- Created: {}", incident.created_at));
    if let Some(at) = &incident.resolved_at {
        lines.push(format!("- Resolved: {at}"));
    }

    section(&mut lines, "DESCRIPTION");
    lines.push(if incident.description.trim().is_empty() {
        "No description available".to_string()
    } else {
        incident.description.clone()
    });

    section(&mut lines, "ANALYSIS REPORT");
    lines.push(if incident.report.trim().is_empty() {
        "Report generation in progress...".to_string()
    } else {
        incident.report.clone()
    });

    if !incident.suggestions.is_empty() {
        section(&mut lines, "SUGGESTED ACTIONS");
        lines.extend(incident.suggestions.iter().take(5).map(|s| format!("- {s}")));
    }

    if incident.status == IncidentStatus::Open {
        section(&mut lines, "ACTION REQUIRED");
        lines.push("Choose how to handle this incident:".to_string());
        lines.push(String::new());
        lines.push("AUTO HEAL (automated resolution):".to_string());
        lines.push(action_link(action_base_url, &incident.id, "auto"));
        lines.push(String::new());
        lines.push("MANUAL HANDLING (operator intervention):".to_string());
        lines.push(action_link(action_base_url, &incident.id, "manual"));
    } else if kind == NotificationKind::ManualInterventionRequired {
        section(&mut lines, "NEXT STEPS");
        lines.push("1. Review the incident details above".to_string());
        lines.push("2. Investigate the root cause of the failure".to_string());
        lines.push("3. Take appropriate manual remediation actions".to_string());
        lines.push(format!(
            "4. Mark the incident resolved: {}",
            action_link(action_base_url, &incident.id, "manual")
        ));
    }

    lines.push(String::new());
    lines.push(RULE.to_string());
    lines.push(format!("Incident ID: {}", incident.id));

    let mut attributes = BTreeMap::new();
    attributes.insert("incident_id".to_string(), incident.id.clone());
    attributes.insert("severity".to_string(), incident.severity.as_str().to_string());
    attributes.insert(
        "incident_type".to_string(),
        incident.incident_type.as_str().to_string(),
    );
    attributes.insert("environment".to_string(), incident.environment.clone());
    attributes.insert("notification_type".to_string(), kind.as_str().to_string());

    RenderedNotification {
        kind,
        subject,
        body: lines.join("\n"),
        attributes,
    }
}

/// Result of one emission attempt. Informational; never a pipeline error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub kind: Option<NotificationKind>,
    pub message_id: Option<String>,
    pub error: Option<String>,
    /// Whether the audit fields were written back onto the incident.
    pub recorded: bool,
}

impl Delivery {
    pub fn sent(&self) -> bool {
        self.message_id.is_some()
    }
}

/// Channel stand-in used when no webhook is configured: logs the message and reports
/// `NOTIFY_NOT_CONFIGURED` so the audit fields say so.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(
        &self,
        subject: &str,
        _body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<String, AppError> {
        tracing::info!(
            incident_id = attributes.get("incident_id").map(String::as_str).unwrap_or(""),
            %subject,
            "notification channel not configured; message logged only"
        );
        Err(AppError::new(NOTIFY_NOT_CONFIGURED, "Notification channel not configured"))
    }
}

pub struct Emitter<'a> {
    notifier: &'a dyn Notifier,
    store: &'a dyn IncidentStore,
    action_base_url: String,
}

impl<'a> Emitter<'a> {
    pub fn new(notifier: &'a dyn Notifier, store: &'a dyn IncidentStore, action_base_url: impl Into<String>) -> Self {
        Self {
            notifier,
            store,
            action_base_url: action_base_url.into(),
        }
    }

    /// Render for the incident's current status, publish, and record the outcome.
    pub fn emit(&self, incident: &Incident) -> Delivery {
        self.deliver(incident, false)
    }

    /// Re-send for a status already notified once. A failure keeps an earlier
    /// successful send on record and only updates `notification_error`.
    pub fn retry(&self, incident: &Incident) -> Delivery {
        self.deliver(incident, true)
    }

    fn deliver(&self, incident: &Incident, retry: bool) -> Delivery {
        let Some(kind) = NotificationKind::for_status(incident.status) else {
            return Delivery {
                kind: None,
                message_id: None,
                error: None,
                recorded: false,
            };
        };
        let rendered = render(incident, kind, &self.action_base_url);

        let result = self
            .notifier
            .publish(&rendered.subject, &rendered.body, &rendered.attributes);

        let (message_id, error) = match result {
            Ok(id) => {
                tracing::info!(
                    incident_id = %incident.id,
                    kind = kind.as_str(),
                    message_id = %id,
                    "notification published"
                );
                (Some(id), None)
            }
            Err(e) => {
                if e.code == NOTIFY_NOT_CONFIGURED {
                    tracing::debug!(incident_id = %incident.id, "notification skipped: {e}");
                } else {
                    tracing::warn!(incident_id = %incident.id, kind = kind.as_str(), "notification failed: {e}");
                }
                (None, Some(e.to_string()))
            }
        };

        let recorded = self.record(incident, message_id.is_some(), retry, error.clone());
        Delivery {
            kind: Some(kind),
            message_id,
            error,
            recorded,
        }
    }

    fn record(&self, incident: &Incident, sent: bool, retry: bool, error: Option<String>) -> bool {
        let now = match now_rfc3339_utc() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(incident_id = %incident.id, "failed to record notification audit: {e}");
                return false;
            }
        };
        let patch = IncidentPatch {
            email_sent: if !sent && retry && incident.email_sent {
                None
            } else {
                Some(sent)
            },
            email_sent_at: if sent { Some(Some(now)) } else { None },
            notification_error: Some(error),
            ..IncidentPatch::default()
        };
        match self.store.conditional_update(&incident.id, incident.status, &patch) {
            Ok(_) => true,
            Err(e) => {
                // The incident moved on; the next transition's notification will record.
                tracing::warn!(incident_id = %incident.id, "notification audit not recorded: {e}");
                false
            }
        }
    }
}
