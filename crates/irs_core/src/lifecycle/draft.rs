use crate::classify::Classification;
use crate::clock::{new_incident_id, now_rfc3339_utc};
use crate::domain::{ActionStatus, Incident, IncidentStatus, IncidentType};
use crate::error::AppError;
use crate::ingress::AlarmEvent;

pub const REPORTER: &str = "cloudwatch-alarm";
const URGENT_THRESHOLD: f64 = 90.0;
const URGENT_SUGGESTION: &str = "URGENT: Threshold exceeded 90% - immediate action required";
const MAX_SUGGESTIONS: usize = 5;

pub fn title_for(incident_type: IncidentType, alarm_name: &str) -> String {
    format!("{} - {alarm_name}", incident_type.display_name())
}

pub fn tags_for(incident_type: IncidentType, environment: &str) -> Vec<String> {
    let mut tags = vec![
        incident_type.as_str().to_ascii_lowercase(),
        environment.to_string(),
        "cloudwatch-auto".to_string(),
    ];
    let extra: &[&str] = match incident_type {
        IncidentType::CpuHigh | IncidentType::MemHigh => &["resource", "performance"],
        IncidentType::AppCrash | IncidentType::AppShutdown => &["availability", "application"],
        IncidentType::AppError => &["application", "error"],
        IncidentType::Other => &[],
    };
    tags.extend(extra.iter().map(|s| s.to_string()));
    tags
}

/// Canned, type-keyed suggestions. Also the generator's fallback list.
pub fn canned_suggestions(incident_type: IncidentType) -> Vec<String> {
    let items: &[&str] = match incident_type {
        IncidentType::CpuHigh => &[
            "Check running processes consuming high CPU",
            "Scale up instance if needed",
            "Restart application services",
            "Review application performance",
        ],
        IncidentType::MemHigh => &[
            "Check memory usage by processes",
            "Clear application cache",
            "Restart memory-intensive services",
            "Scale up instance memory",
        ],
        IncidentType::AppCrash => &[
            "Check application logs for crash reason",
            "Restart crashed application",
            "Check resource limits and dependencies",
            "Review recent deployments",
        ],
        IncidentType::AppShutdown => &[
            "Check if shutdown was planned",
            "Restart the application service",
            "Check system resources",
            "Review application health",
        ],
        IncidentType::AppError => &[
            "Check application logs for error details",
            "Review recent deployments",
            "Check database connectivity",
            "Restart application services",
        ],
        IncidentType::Other => &["Investigate the issue", "Check system logs"],
    };
    items.iter().map(|s| s.to_string()).collect()
}

/// Put the urgent item first when the threshold is above 90, keeping at most five.
fn with_urgency(mut suggestions: Vec<String>, threshold: Option<f64>) -> Vec<String> {
    if threshold.is_some_and(|t| t > URGENT_THRESHOLD) && !suggestions.iter().any(|s| s == URGENT_SUGGESTION) {
        suggestions.insert(0, URGENT_SUGGESTION.to_string());
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

fn initial_report(alarm: &AlarmEvent, c: &Classification) -> String {
    let mut parts = vec![format!(
        "Incident auto-detected from CloudWatch alarm: {}",
        alarm.name
    )];
    if matches!(c.incident_type, IncidentType::CpuHigh | IncidentType::MemHigh) {
        let m = &alarm.metric;
        parts.push(format!(
            "Metric: {}",
            m.metric_name.as_deref().unwrap_or("Unknown")
        ));
        parts.push(format!(
            "Threshold: {}",
            m.threshold.map(|t| t.to_string()).unwrap_or_else(|| "Unknown".to_string())
        ));
        parts.push(format!(
            "Comparison: {}",
            m.comparison_operator.as_deref().unwrap_or("Unknown")
        ));
    }
    parts.push(format!("Instance: {}", c.resource_ref));
    parts.push(format!(
        "Triggered at: {}",
        alarm.state_change_time.as_deref().unwrap_or("Unknown")
    ));
    parts.join(". ")
}

/// Build a new `open` incident from an admitted alarm. Nothing is persisted here.
pub fn draft_incident(
    alarm: &AlarmEvent,
    classification: &Classification,
    environment: &str,
) -> Result<Incident, AppError> {
    let now = now_rfc3339_utc()?;
    let description = if alarm.reason.trim().is_empty() {
        alarm.description.clone()
    } else {
        alarm.reason.clone()
    };

    Ok(Incident {
        id: new_incident_id(),
        resource_ref: classification.resource_ref.clone(),
        incident_type: classification.incident_type,
        severity: classification.severity,
        category: classification.category,
        status: IncidentStatus::Open,
        action_status: ActionStatus::Auto,
        title: title_for(classification.incident_type, &alarm.name),
        description,
        environment: environment.to_string(),
        reporter: REPORTER.to_string(),
        alarm_name: alarm.name.clone(),
        metric_name: alarm.metric.metric_name.clone(),
        threshold: alarm.metric.threshold,
        tags: tags_for(classification.incident_type, environment),
        report: initial_report(alarm, classification),
        suggestions: with_urgency(canned_suggestions(classification.incident_type), alarm.metric.threshold),
        action_taken: None,
        email_sent: false,
        email_sent_at: None,
        notification_error: None,
        execution_ref: None,
        created_at: now.clone(),
        resolved_at: None,
        completed_at: None,
        updated_at: now,
    })
}

/// Fold generated narrative and suggestions into a draft. The detection summary stays
/// on top of the report and the urgent item stays first in the suggestions.
pub fn apply_generated(draft: &mut Incident, report: &str, suggestions: Vec<String>) {
    let report = report.trim();
    if !report.is_empty() {
        draft.report = format!("{}\n\n{report}", draft.report);
    }
    if !suggestions.is_empty() {
        draft.suggestions = with_urgency(suggestions, draft.threshold);
    }
}
