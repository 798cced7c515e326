//! Remediation planning and execution.
//!
//! A plan is an ordered list of named actions chosen from the incident type. The
//! dispatcher runs them in order and stops at the first definitive failure; the failure
//! route is always manual escalation, so plans carry no per-action fallback.

pub mod actions;
pub mod capabilities;
pub mod dispatcher;

use serde::{Deserialize, Serialize};

use crate::domain::{Incident, IncidentType, Severity};

pub use actions::{ActionOutcome, ActionReport};
pub use capabilities::{CommandOutput, ComputeApi, InstanceDescription, RemoteExec, RemoteSession};
pub use dispatcher::{Dispatcher, PlanOutcome, PlanVerdict};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RemediationAction {
    ResizeResource,
    RestartService,
    EscalateManual,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::ResizeResource => "resizeResource",
            RemediationAction::RestartService => "restartService",
            RemediationAction::EscalateManual => "escalateManual",
        }
    }

    /// Whether a failure part-way through can leave the external resource half-mutated.
    pub fn mutates_resource(&self) -> bool {
        !matches!(self, RemediationAction::EscalateManual)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemediationPlan {
    pub actions: Vec<RemediationAction>,
}

impl RemediationPlan {
    pub fn new(actions: Vec<RemediationAction>) -> Self {
        Self { actions }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.as_str()).collect()
    }

    /// True when the plan performs at least one remote mutation.
    pub fn has_known_remedy(&self) -> bool {
        self.actions.iter().any(|a| a.mutates_resource())
    }
}

/// Maps an incident to its remediation plan. Replaceable policy, injected into the
/// orchestrator.
pub trait StrategySelector {
    fn plan_for(&self, incident: &Incident) -> RemediationPlan;
}

/// Resource pressure is resized, application faults are restarted, everything else goes
/// to a human.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl DefaultStrategy {
    pub fn plan(incident_type: IncidentType, _severity: Severity) -> RemediationPlan {
        let actions = match incident_type {
            IncidentType::CpuHigh | IncidentType::MemHigh => vec![RemediationAction::ResizeResource],
            IncidentType::AppCrash | IncidentType::AppShutdown | IncidentType::AppError => {
                vec![RemediationAction::RestartService]
            }
            IncidentType::Other => vec![RemediationAction::EscalateManual],
        };
        RemediationPlan::new(actions)
    }
}

impl StrategySelector for DefaultStrategy {
    fn plan_for(&self, incident: &Incident) -> RemediationPlan {
        Self::plan(incident.incident_type, incident.severity)
    }
}
