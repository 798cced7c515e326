use irs_core::domain::{Incident, IncidentType, Severity};

fn type_context(incident_type: IncidentType) -> &'static str {
    match incident_type {
        IncidentType::CpuHigh => {
            "CPU high utilization context:\n\
             - Monitor for sustained vs spike patterns\n\
             - Check for runaway processes or inefficient code\n\
             - Consider CPU-intensive operations or increased load\n\
             - Review auto-scaling policies and thresholds"
        }
        IncidentType::MemHigh => {
            "Memory high utilization context:\n\
             - Check for memory leaks in applications\n\
             - Monitor garbage collection performance\n\
             - Review memory allocation patterns\n\
             - Consider container memory limits"
        }
        IncidentType::AppCrash => {
            "Application crash context:\n\
             - Check application logs for crash signals\n\
             - Review recent deployments or changes\n\
             - Look for resource exhaustion (OOM killer)\n\
             - Analyze crash dumps if available"
        }
        IncidentType::AppShutdown => {
            "Application shutdown context:\n\
             - Determine if shutdown was graceful or forced\n\
             - Check for system-level shutdown signals\n\
             - Review process health checks and dependencies\n\
             - Look for resource constraints causing shutdown"
        }
        IncidentType::AppError => {
            "Application error context:\n\
             - Review error logs and stack traces\n\
             - Check external dependencies (DB, APIs, services)\n\
             - Analyze error patterns and frequency\n\
             - Consider configuration or deployment issues"
        }
        IncidentType::Other => "General context:\n- Establish scope and recent changes before acting",
    }
}

pub(crate) fn incident_context(incident: &Incident) -> String {
    let mut parts = vec![type_context(incident.incident_type).to_string()];
    if incident.environment == "production" {
        parts.push("Production environment: prioritize fast resolution to minimize user impact.".to_string());
    }
    if incident.severity >= Severity::High {
        parts.push("High priority: this incident requires immediate attention and escalation.".to_string());
    }
    parts.join("\n\n")
}

pub fn report_prompt(incident: &Incident) -> String {
    let context = incident_context(incident);
    format!(
        r#"You are an expert DevOps engineer analyzing a system incident. Generate a concise but comprehensive incident report.

Incident details:
- ID: {id}
- Title: {title}
- Type: {incident_type}
- Severity: {severity}
- Environment: {environment}
- Resource: {resource}
- Description: {description}
- Created: {created}

Detection notes:
{notes}

Additional context:
{context}

Provide a structured technical report covering:
1. Summary: brief overview of the incident
2. Technical analysis: what happened and why
3. Impact assessment: services and users affected
4. Root cause: likely cause of the issue

Keep the report concise but informative. Format as markdown.
"#,
        id = incident.id,
        title = incident.title,
        incident_type = incident.incident_type.as_str(),
        severity = incident.severity.as_str(),
        environment = incident.environment,
        resource = incident.resource_ref,
        description = incident.description,
        created = incident.created_at,
        notes = incident.report,
    )
}

pub fn suggestions_prompt(incident: &Incident) -> String {
    format!(
        r#"Based on this {incident_type} incident in the {environment} environment:
- Severity: {severity}
- Resource: {resource}
- Description: {description}

Provide 4-5 specific actionable suggestions for immediate resolution.

Focus on:
1. Immediate remediation steps
2. System stabilization actions
3. Monitoring/verification steps
4. Prevention measures

Return ONLY a simple numbered list without explanations.
"#,
        incident_type = incident.incident_type.as_str(),
        environment = incident.environment,
        severity = incident.severity.as_str(),
        resource = incident.resource_ref,
        description = incident.description,
    )
}
