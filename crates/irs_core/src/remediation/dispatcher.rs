use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::actions::{self, ActionOutcome, ActionReport, ResizeParams, RestartParams};
use super::capabilities::{ComputeApi, RemoteExec};
use super::{RemediationAction, RemediationPlan};
use crate::config::RemediationConfig;
use crate::domain::Incident;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum PlanVerdict {
    Succeeded,
    Failed {
        action: RemediationAction,
        reason: String,
        intermediate_state: Option<String>,
    },
    ManualRequired,
    /// The plan deadline passed between steps; remaining actions were not started.
    Aborted {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanOutcome {
    pub steps: Vec<ActionReport>,
    pub verdict: PlanVerdict,
}

impl PlanOutcome {
    /// Human-readable summary stored as the incident report after the plan finishes.
    pub fn report_text(&self) -> String {
        let mut lines = Vec::new();
        match &self.verdict {
            PlanVerdict::Succeeded => lines.push("Remediation completed successfully.".to_string()),
            PlanVerdict::Failed { action, reason, .. } => {
                lines.push(format!("Remediation failed at {}: {reason}", action.as_str()))
            }
            PlanVerdict::ManualRequired => lines.push("Manual intervention required.".to_string()),
            PlanVerdict::Aborted { reason } => lines.push(format!("Remediation aborted: {reason}")),
        }
        for step in &self.steps {
            lines.push(format!("- {}", step.describe()));
        }
        lines.join("\n")
    }

    /// Short one-liner for the incident's `actionTaken` field.
    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.steps.iter().map(|s| s.action.as_str()).collect();
        let names = if names.is_empty() {
            "no actions".to_string()
        } else {
            names.join(", ")
        };
        match &self.verdict {
            PlanVerdict::Succeeded => format!("Auto resolution completed: {names}"),
            PlanVerdict::Failed { reason, .. } => format!("Auto resolution failed: {reason}"),
            PlanVerdict::ManualRequired => format!("Escalated for manual intervention: {names}"),
            PlanVerdict::Aborted { reason } => format!("Auto resolution aborted: {reason}"),
        }
    }
}

/// Executes remediation plans against the injected capabilities.
pub struct Dispatcher<'a> {
    compute: &'a dyn ComputeApi,
    exec: &'a dyn RemoteExec,
    config: RemediationConfig,
}

impl<'a> Dispatcher<'a> {
    pub fn new(compute: &'a dyn ComputeApi, exec: &'a dyn RemoteExec, config: RemediationConfig) -> Self {
        Self { compute, exec, config }
    }

    fn run_action(&self, action: RemediationAction, resource_ref: &str) -> ActionReport {
        match action {
            RemediationAction::ResizeResource => actions::resize_resource(
                self.compute,
                resource_ref,
                &ResizeParams {
                    target_instance_type: self.config.target_instance_type.clone(),
                    stop_timeout: self.config.stop_timeout(),
                },
            ),
            RemediationAction::RestartService => actions::restart_service(
                self.exec,
                resource_ref,
                &RestartParams {
                    service_name: self.config.service_name.clone(),
                    connect_timeout: self.config.connect_timeout(),
                    settle_delay: self.config.settle_delay(),
                    log_tail_lines: self.config.log_tail_lines,
                    log_tail_chars: self.config.log_tail_chars,
                },
            ),
            RemediationAction::EscalateManual => actions::escalate_manual(resource_ref),
        }
    }

    /// Run the plan's actions in order. Stops at the first failure; `Skip` counts as success.
    /// The deadline is only checked between steps, never mid-action.
    pub fn execute(&self, incident: &Incident, plan: &RemediationPlan) -> PlanOutcome {
        let started = Instant::now();
        let deadline = self.config.plan_deadline();
        let mut steps = Vec::with_capacity(plan.actions.len());

        if plan.actions.is_empty() {
            tracing::info!(incident_id = %incident.id, "empty remediation plan, manual intervention required");
            return PlanOutcome {
                steps,
                verdict: PlanVerdict::ManualRequired,
            };
        }

        let mut manual = false;
        for (idx, action) in plan.actions.iter().enumerate() {
            if idx > 0 && started.elapsed() >= deadline {
                let reason = format!(
                    "plan deadline of {}s exceeded before {}",
                    deadline.as_secs(),
                    action.as_str()
                );
                tracing::warn!(incident_id = %incident.id, %reason, "aborting remediation plan");
                return PlanOutcome {
                    steps,
                    verdict: PlanVerdict::Aborted { reason },
                };
            }

            tracing::info!(
                incident_id = %incident.id,
                resource_ref = %incident.resource_ref,
                action = action.as_str(),
                "running remediation action"
            );
            let report = self.run_action(*action, &incident.resource_ref);

            if let ActionOutcome::Failure {
                reason,
                intermediate_state,
            } = &report.outcome
            {
                tracing::warn!(
                    incident_id = %incident.id,
                    action = action.as_str(),
                    %reason,
                    intermediate_state = intermediate_state.as_deref().unwrap_or("none"),
                    "remediation action failed"
                );
                let verdict = PlanVerdict::Failed {
                    action: *action,
                    reason: reason.clone(),
                    intermediate_state: intermediate_state.clone(),
                };
                steps.push(report);
                return PlanOutcome { steps, verdict };
            }

            if *action == RemediationAction::EscalateManual {
                manual = true;
            }
            steps.push(report);
        }

        PlanOutcome {
            steps,
            verdict: if manual {
                PlanVerdict::ManualRequired
            } else {
                PlanVerdict::Succeeded
            },
        }
    }
}
