use irs_core::domain::{Incident, IncidentType};
use irs_core::lifecycle::canned_suggestions;
use serde::{Deserialize, Serialize};

use crate::llm::Llm;

mod prompts;
pub mod suggestions;

pub use prompts::{report_prompt, suggestions_prompt};
pub use suggestions::parse_suggestions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedReport {
    /// Never empty.
    pub report: String,
    /// One to five items.
    pub suggestions: Vec<String>,
    pub report_source: ContentSource,
    pub suggestions_source: ContentSource,
}

/// Deterministic narrative used whenever the model is absent or fails.
pub fn fallback_report(incident: &Incident) -> String {
    let analysis = match incident.incident_type {
        IncidentType::CpuHigh => "CPU utilization crossed its alarm threshold on the affected resource.",
        IncidentType::MemHigh => "Memory utilization crossed its alarm threshold on the affected resource.",
        IncidentType::AppCrash => "The monitored application process terminated unexpectedly.",
        IncidentType::AppShutdown => "The monitored application service stopped running.",
        IncidentType::AppError => "The monitored application reported errors above its alarm threshold.",
        IncidentType::Other => "System monitoring detected an anomaly that triggered this incident.",
    };
    let mut lines = vec![
        "## Incident Report".to_string(),
        String::new(),
        format!(
            "**Summary**: {} on {} ({} severity, {}).",
            incident.incident_type.display_name(),
            incident.resource_ref,
            incident.severity.as_str(),
            incident.environment
        ),
        String::new(),
        format!("**Technical Analysis**: {analysis}"),
    ];
    if !incident.description.trim().is_empty() {
        lines.push(String::new());
        lines.push(format!("**Alarm Reason**: {}", incident.description.trim()));
    }
    lines.push(String::new());
    lines.push(
        "**Impact Assessment**: Potentially affecting system performance and user experience. Impact scope needs manual verification."
            .to_string(),
    );
    lines.push(String::new());
    lines.push(
        "**Root Cause**: To be determined through investigation of logs, metrics and system status."
            .to_string(),
    );
    lines.push(String::new());
    lines.push(format!("**Context**:\n{}", prompts::incident_context(incident)));
    lines.join("\n")
}

/// Narrative and suggestion generation with a per-part deterministic fallback.
pub struct ReportGenerator<'a> {
    llm: Option<&'a dyn Llm>,
    model: String,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(llm: Option<&'a dyn Llm>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Only a fallback; used when no model endpoint is configured.
    pub fn fallback_only() -> Self {
        Self {
            llm: None,
            model: String::new(),
        }
    }

    fn ask(&self, incident: &Incident, what: &str, prompt: &str) -> Option<String> {
        let llm = self.llm?;
        match llm.generate(&self.model, prompt) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                tracing::warn!(incident_id = %incident.id, part = what, "model returned empty text, using fallback");
                None
            }
            Err(e) => {
                tracing::warn!(incident_id = %incident.id, part = what, "generation failed, using fallback: {e}");
                None
            }
        }
    }

    pub fn generate(&self, incident: &Incident) -> GeneratedReport {
        let (report, report_source) = match self.ask(incident, "report", &report_prompt(incident)) {
            Some(text) => (text.trim().to_string(), ContentSource::Model),
            None => (fallback_report(incident), ContentSource::Fallback),
        };

        let (suggestions, suggestions_source) =
            match self.ask(incident, "suggestions", &suggestions_prompt(incident)) {
                Some(text) => (parse_suggestions(&text), ContentSource::Model),
                None => {
                    let mut canned = canned_suggestions(incident.incident_type);
                    canned.truncate(suggestions::MAX_SUGGESTIONS);
                    (canned, ContentSource::Fallback)
                }
            };

        tracing::debug!(
            incident_id = %incident.id,
            report_source = ?report_source,
            suggestions_source = ?suggestions_source,
            "report generated"
        );

        GeneratedReport {
            report,
            suggestions,
            report_source,
            suggestions_source,
        }
    }
}
