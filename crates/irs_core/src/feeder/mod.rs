//! Contract with the downstream similarity-search feeder.
//!
//! Only resolved or closed incidents are handed over. Past that point the lifecycle no
//! longer rewrites report, suggestions or classification, so a snapshot stays valid.

use serde::{Deserialize, Serialize};

use crate::domain::{Category, Incident, IncidentStatus, IncidentType, Severity};
use crate::error::AppError;

pub fn is_eligible(status: IncidentStatus) -> bool {
    status.is_resolved()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub incident_id: String,
    pub title: String,
    pub description: String,
    pub report: String,
    pub suggestions: Vec<String>,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub category: Category,
    pub environment: String,
    pub status: IncidentStatus,
    pub action_taken: Option<String>,
    pub tags: Vec<String>,
    pub resolved_at: Option<String>,
}

impl FeedSnapshot {
    pub fn from_incident(incident: &Incident) -> Result<Self, AppError> {
        if !is_eligible(incident.status) {
            return Err(AppError::new(
                "FEED_NOT_ELIGIBLE",
                "Only resolved or closed incidents can be fed downstream",
            )
            .with_details(format!(
                "incident_id={}; status={}",
                incident.id,
                incident.status.as_str()
            )));
        }
        Ok(Self {
            incident_id: incident.id.clone(),
            title: incident.title.clone(),
            description: incident.description.clone(),
            report: incident.report.clone(),
            suggestions: incident.suggestions.clone(),
            incident_type: incident.incident_type,
            severity: incident.severity,
            category: incident.category,
            environment: incident.environment.clone(),
            status: incident.status,
            action_taken: incident.action_taken.clone(),
            tags: incident.tags.clone(),
            resolved_at: incident.resolved_at.clone(),
        })
    }

    /// Deterministic text used for embedding and hashing. Empty optional parts are omitted.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        if !self.title.is_empty() {
            parts.push(format!("Title: {}", self.title));
        }
        if !self.description.is_empty() {
            parts.push(format!("Description: {}", self.description));
        }
        if !self.report.is_empty() {
            parts.push(format!("Report: {}", self.report));
        }
        parts.push(format!("Type: {}", self.incident_type.as_str()));
        parts.push(format!("Severity: {}", self.severity.as_str()));
        parts.push(format!("Category: {}", self.category.as_str()));
        parts.push(format!("Environment: {}", self.environment));
        if let Some(a) = self.action_taken.as_deref().filter(|a| !a.is_empty()) {
            parts.push(format!("Action Taken: {a}"));
        }
        if !self.suggestions.is_empty() {
            parts.push(format!("Suggestions: {}", self.suggestions.join(". ")));
        }
        if !self.tags.is_empty() {
            parts.push(format!("Tags: {}", self.tags.join(", ")));
        }
        parts.join(". ")
    }
}
