use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::capabilities::{ComputeApi, RemoteExec, RemoteSession};
use super::RemediationAction;
use crate::domain::UNKNOWN_RESOURCE;

/// Tri-state result of one action. `Skip` means "already in the desired state" and counts
/// as success for the plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ActionOutcome {
    Success {
        summary: String,
    },
    Skip {
        reason: String,
    },
    Failure {
        reason: String,
        /// What an operator must check when the resource may be half-mutated.
        /// `None` only when nothing was changed remotely.
        intermediate_state: Option<String>,
    },
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failure { .. })
    }

    fn failed(reason: impl Into<String>, intermediate_state: Option<&str>) -> Self {
        ActionOutcome::Failure {
            reason: reason.into(),
            intermediate_state: intermediate_state.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub action: RemediationAction,
    pub resource_ref: String,
    pub outcome: ActionOutcome,
    /// Resize only: whether the resource was running before, i.e. whether it was disrupted.
    pub was_running: Option<bool>,
    pub status_before: Option<String>,
    pub status_after: Option<String>,
    pub recent_logs: Option<String>,
}

impl ActionReport {
    fn new(action: RemediationAction, resource_ref: &str, outcome: ActionOutcome) -> Self {
        Self {
            action,
            resource_ref: resource_ref.to_string(),
            outcome,
            was_running: None,
            status_before: None,
            status_after: None,
            recent_logs: None,
        }
    }

    /// One-paragraph rendering used for incident reports.
    pub fn describe(&self) -> String {
        let mut out = match &self.outcome {
            ActionOutcome::Success { summary } => format!("{}: {summary}", self.action.as_str()),
            ActionOutcome::Skip { reason } => format!("{}: skipped ({reason})", self.action.as_str()),
            ActionOutcome::Failure {
                reason,
                intermediate_state,
            } => {
                let mut s = format!("{}: FAILED: {reason}", self.action.as_str());
                if let Some(state) = intermediate_state {
                    s.push_str(&format!(". Resource may be in an intermediate state: {state}"));
                }
                s
            }
        };
        if let Some(was_running) = self.was_running {
            out.push_str(&format!(". Was running before: {was_running}"));
        }
        if let (Some(before), Some(after)) = (&self.status_before, &self.status_after) {
            out.push_str(&format!(". Service status: {before} -> {after}"));
        }
        if let Some(logs) = self.recent_logs.as_deref().filter(|l| !l.is_empty()) {
            out.push_str(&format!("\nRecent logs:\n{logs}"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeParams {
    pub target_instance_type: String,
    pub stop_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartParams {
    pub service_name: String,
    pub connect_timeout: Duration,
    pub settle_delay: Duration,
    pub log_tail_lines: u32,
    pub log_tail_chars: usize,
}

fn unknown_resource(resource_ref: &str) -> bool {
    resource_ref.trim().is_empty() || resource_ref == UNKNOWN_RESOURCE
}

/// Resize to the target spec: stop if running, change the type, restart if it was running.
pub fn resize_resource(compute: &dyn ComputeApi, resource_ref: &str, params: &ResizeParams) -> ActionReport {
    let action = RemediationAction::ResizeResource;
    if unknown_resource(resource_ref) {
        return ActionReport::new(
            action,
            resource_ref,
            ActionOutcome::failed("No resource identifier on the incident", None),
        );
    }

    let desc = match compute.describe(resource_ref) {
        Ok(d) => d,
        Err(e) => {
            return ActionReport::new(
                action,
                resource_ref,
                ActionOutcome::failed(format!("Failed to describe resource: {e}"), None),
            );
        }
    };

    let target = params.target_instance_type.as_str();
    let was_running = desc.is_running();
    let mut report = ActionReport::new(
        action,
        resource_ref,
        ActionOutcome::Skip {
            reason: format!("already {target}"),
        },
    );
    report.was_running = Some(was_running);
    report.status_before = Some(desc.state.clone());

    if desc.instance_type == target {
        report.status_after = Some(desc.state);
        return report;
    }

    if was_running {
        if let Err(e) = compute.stop(resource_ref) {
            report.outcome = ActionOutcome::failed(
                format!("Failed to stop resource: {e}"),
                Some("stop may have been requested; resource state unknown, type unchanged"),
            );
            return report;
        }
        if let Err(e) = compute.wait_stopped(resource_ref, params.stop_timeout) {
            report.outcome = ActionOutcome::failed(
                format!("Resource did not reach stopped state: {e}"),
                Some("stopping or stopped, not resized"),
            );
            return report;
        }
    }

    if let Err(e) = compute.set_instance_type(resource_ref, target) {
        let state = if was_running {
            Some("stopped but not resized")
        } else {
            None
        };
        report.outcome = ActionOutcome::failed(format!("Failed to change instance type: {e}"), state);
        return report;
    }

    if was_running {
        if let Err(e) = compute.start(resource_ref) {
            report.outcome = ActionOutcome::failed(
                format!("Failed to start resource after resize: {e}"),
                Some("resized but left stopped"),
            );
            return report;
        }
    }

    report.status_after = Some(if was_running { "running" } else { "stopped" }.to_string());
    report.outcome = ActionOutcome::Success {
        summary: format!(
            "Resized {resource_ref} from {} to {target}",
            desc.instance_type
        ),
    };
    report
}

fn valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
}

/// Last `max` characters of `s`, on a char boundary.
fn tail_chars(s: &str, max: usize) -> &str {
    if max == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

fn run_trimmed(session: &mut dyn RemoteSession, command: &str) -> Result<String, String> {
    session
        .run(command)
        .map(|o| o.stdout.trim().to_string())
        .map_err(|e| e.to_string())
}

/// Restart a systemd service on the resource and capture before/after state and a log tail.
pub fn restart_service(exec: &dyn RemoteExec, resource_ref: &str, params: &RestartParams) -> ActionReport {
    let action = RemediationAction::RestartService;
    let service = params.service_name.as_str();

    if unknown_resource(resource_ref) {
        return ActionReport::new(
            action,
            resource_ref,
            ActionOutcome::failed("No resource identifier on the incident", None),
        );
    }
    if !valid_service_name(service) {
        return ActionReport::new(
            action,
            resource_ref,
            ActionOutcome::failed(format!("Invalid service name {service:?}"), None),
        );
    }

    let mut session = match exec.connect(resource_ref, params.connect_timeout) {
        Ok(s) => s,
        Err(e) => {
            return ActionReport::new(
                action,
                resource_ref,
                ActionOutcome::failed(format!("Remote connection failed: {e}"), None),
            );
        }
    };
    let session = session.as_mut();

    let mut report = ActionReport::new(
        action,
        resource_ref,
        ActionOutcome::Success {
            summary: String::new(),
        },
    );

    match run_trimmed(
        session,
        &format!("systemctl list-units --type=service --all | grep {service}"),
    ) {
        Ok(listing) if listing.is_empty() => {
            report.outcome = ActionOutcome::failed(format!("Service {service} not found"), None);
            return report;
        }
        Ok(_) => {}
        Err(e) => {
            report.outcome = ActionOutcome::failed(format!("Failed to list services: {e}"), None);
            return report;
        }
    }

    report.status_before = Some(
        run_trimmed(session, &format!("systemctl is-active {service}"))
            .unwrap_or_else(|_| "unknown".to_string()),
    );

    match session.run(&format!("sudo systemctl restart {service}")) {
        Ok(out) => {
            let stderr = out.stderr.trim();
            let bad_exit = out.exit_code.map(|c| c != 0).unwrap_or(false);
            if bad_exit || (!stderr.is_empty() && !stderr.contains("Warning")) {
                report.outcome = ActionOutcome::failed(
                    format!("Failed to restart service: {stderr}"),
                    Some("restart issued; service state unknown"),
                );
                return report;
            }
        }
        Err(e) => {
            report.outcome = ActionOutcome::failed(
                format!("Failed to restart service: {e}"),
                Some("restart may have been issued; service state unknown"),
            );
            return report;
        }
    }

    if !params.settle_delay.is_zero() {
        std::thread::sleep(params.settle_delay);
    }

    let after = run_trimmed(session, &format!("systemctl is-active {service}"))
        .unwrap_or_else(|_| "unknown".to_string());
    let logs = run_trimmed(
        session,
        &format!(
            "sudo journalctl -u {service} -n {} --no-pager",
            params.log_tail_lines
        ),
    )
    .unwrap_or_default();
    report.recent_logs = Some(tail_chars(&logs, params.log_tail_chars).to_string());

    let active = after == "active";
    report.status_after = Some(after.clone());
    report.outcome = if active {
        ActionOutcome::Success {
            summary: format!("Service {service} restarted on {resource_ref} and is active"),
        }
    } else {
        ActionOutcome::failed(
            format!("Service {service} is {after:?} after restart"),
            Some("service restarted but not active"),
        )
    };
    report
}

/// Performs no remote mutation; the dispatcher turns this into a manual-intervention verdict.
pub fn escalate_manual(resource_ref: &str) -> ActionReport {
    ActionReport::new(
        RemediationAction::EscalateManual,
        resource_ref,
        ActionOutcome::Success {
            summary: "Manual intervention required".to_string(),
        },
    )
}
