//! Incident lifecycle state machine.
//!
//! The only writer of `status`, `actionStatus` and `executionRef`. Every write goes through
//! `IncidentStore::conditional_update`, so concurrent triggers for one incident serialize on
//! the stored status.
//!
//! Outcome transitions are idempotent: a request whose target is already satisfied is a
//! no-op success. `begin_execution` is not, since a repeat would start a second execution.

pub mod draft;

use serde::{Deserialize, Serialize};

use crate::clock::{new_execution_ref, now_rfc3339_utc};
use crate::domain::{ActionStatus, Incident, IncidentPatch, IncidentStatus};
use crate::error::AppError;
use crate::ingress::{ExecutionOutcome, ResolutionCallback};
use crate::remediation::{PlanOutcome, PlanVerdict, RemediationPlan};
use crate::store::IncidentStore;

pub use draft::{apply_generated, canned_suggestions, draft_incident, tags_for, title_for};

/// Re-read attempts after losing a compare-and-swap race.
const MAX_RECONCILE_ATTEMPTS: usize = 3;

const MANUAL_RESOLUTION_REPORT: &str = "Resolved manually by operator";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionOutcome {
    pub incident: Incident,
    /// False when the target was already satisfied and nothing was written.
    pub applied: bool,
}

/// How a freshly created incident proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPath {
    Auto,
    AwaitOperator,
}

pub fn decide_path(incident: &Incident, plan: &RemediationPlan, auto_remediate: bool) -> EntryPath {
    if !auto_remediate {
        return EntryPath::AwaitOperator;
    }
    if plan.has_known_remedy() && !incident.has_known_resource() {
        return EntryPath::AwaitOperator;
    }
    EntryPath::Auto
}

fn non_empty_or(text: &str, fallback: impl FnOnce() -> String) -> String {
    if text.trim().is_empty() {
        fallback()
    } else {
        text.to_string()
    }
}

fn status_list(statuses: &[IncidentStatus]) -> String {
    statuses
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("|")
}

pub struct StateMachine<'a> {
    store: &'a dyn IncidentStore,
}

impl<'a> StateMachine<'a> {
    pub fn new(store: &'a dyn IncidentStore) -> Self {
        Self { store }
    }

    pub fn create(&self, incident: &Incident) -> Result<Incident, AppError> {
        if incident.status != IncidentStatus::Open || incident.execution_ref.is_some() {
            return Err(AppError::new(
                "LIFECYCLE_INVALID_INITIAL_STATE",
                "Incidents must be created open with no execution in flight",
            )
            .with_details(format!("incident_id={}", incident.id)));
        }
        let id = self.store.create(incident)?;
        tracing::info!(
            incident_id = %id,
            incident_type = incident.incident_type.as_str(),
            severity = incident.severity.as_str(),
            resource_ref = %incident.resource_ref,
            "incident created"
        );
        self.store.get(&id)
    }

    /// Shared transition driver.
    ///
    /// Reads the stored record; returns a no-op when it is already in one of `satisfied`;
    /// otherwise requires it to be in one of `from` and writes `build(current)` guarded on
    /// the status just read. A lost race re-reads and reconciles.
    fn transition(
        &self,
        id: &str,
        name: &str,
        from: &[IncidentStatus],
        satisfied: &[IncidentStatus],
        build: impl Fn(&Incident, &str) -> IncidentPatch,
    ) -> Result<TransitionOutcome, AppError> {
        let mut last_err = None;
        for _ in 0..MAX_RECONCILE_ATTEMPTS {
            let current = self.store.get(id)?;

            if satisfied.contains(&current.status) {
                tracing::info!(
                    incident_id = %id,
                    transition = name,
                    status = current.status.as_str(),
                    "transition already satisfied, no-op"
                );
                return Ok(TransitionOutcome {
                    incident: current,
                    applied: false,
                });
            }
            if !from.contains(&current.status) {
                tracing::warn!(
                    incident_id = %id,
                    transition = name,
                    status = current.status.as_str(),
                    "transition guard failed"
                );
                return Err(AppError::stale_transition(
                    id,
                    &status_list(from),
                    current.status.as_str(),
                ));
            }

            let now = now_rfc3339_utc()?;
            let mut patch = build(&current, &now);
            if patch.reason.is_none() {
                patch.reason = Some(name.to_string());
            }

            match self.store.conditional_update(id, current.status, &patch) {
                Ok(updated) => {
                    tracing::info!(
                        incident_id = %id,
                        transition = name,
                        from = current.status.as_str(),
                        to = updated.status.as_str(),
                        "incident transitioned"
                    );
                    return Ok(TransitionOutcome {
                        incident: updated,
                        applied: true,
                    });
                }
                Err(e) if e.is_stale() => {
                    tracing::debug!(incident_id = %id, transition = name, "lost status race, re-reading");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::stale_transition(id, &status_list(from), "unknown")))
    }

    /// `open → processing`. Fails with a stale transition for anything but `open`.
    pub fn begin_execution(&self, id: &str, action_status: ActionStatus) -> Result<TransitionOutcome, AppError> {
        let exec_ref = new_execution_ref();
        self.transition(
            id,
            "begin_execution",
            &[IncidentStatus::Open],
            &[],
            |_, _| IncidentPatch {
                status: Some(IncidentStatus::Processing),
                action_status: Some(action_status),
                execution_ref: Some(Some(exec_ref.clone())),
                ..IncidentPatch::default()
            },
        )
    }

    /// `processing → resolved`. Keeps the action status recorded when execution began.
    pub fn remediation_succeeded(
        &self,
        id: &str,
        report: &str,
        action_taken: Option<String>,
    ) -> Result<TransitionOutcome, AppError> {
        self.transition(
            id,
            "remediation_succeeded",
            &[IncidentStatus::Processing],
            &[IncidentStatus::Resolved, IncidentStatus::Closed],
            |cur, now| IncidentPatch {
                status: Some(IncidentStatus::Resolved),
                report: Some(non_empty_or(report, || {
                    format!("{} resolved by automated remediation.", cur.title)
                })),
                action_taken: action_taken.clone(),
                execution_ref: Some(None),
                resolved_at: Some(now.to_string()),
                completed_at: Some(now.to_string()),
                ..IncidentPatch::default()
            },
        )
    }

    /// `processing → pending`, routed to manual handling. Severity is left unchanged.
    pub fn remediation_failed(
        &self,
        id: &str,
        report: &str,
        action_taken: Option<String>,
    ) -> Result<TransitionOutcome, AppError> {
        self.transition(
            id,
            "remediation_failed",
            &[IncidentStatus::Processing],
            &[IncidentStatus::Pending],
            |cur, now| IncidentPatch {
                status: Some(IncidentStatus::Pending),
                action_status: Some(ActionStatus::Manual),
                report: Some(non_empty_or(report, || {
                    format!("Automated remediation failed for {}. Manual intervention required.", cur.title)
                })),
                action_taken: action_taken.clone(),
                execution_ref: Some(None),
                completed_at: Some(now.to_string()),
                ..IncidentPatch::default()
            },
        )
    }

    /// `processing → manual_intervention_required`.
    pub fn escalated(
        &self,
        id: &str,
        report: &str,
        action_taken: Option<String>,
    ) -> Result<TransitionOutcome, AppError> {
        self.transition(
            id,
            "escalated",
            &[IncidentStatus::Processing],
            &[IncidentStatus::ManualInterventionRequired],
            |cur, now| IncidentPatch {
                status: Some(IncidentStatus::ManualInterventionRequired),
                action_status: Some(ActionStatus::Manual),
                report: Some(non_empty_or(report, || {
                    format!("{} requires manual intervention.", cur.title)
                })),
                action_taken: action_taken.clone(),
                execution_ref: Some(None),
                completed_at: Some(now.to_string()),
                ..IncidentPatch::default()
            },
        )
    }

    /// `processing → failed`.
    pub fn execution_aborted(&self, id: &str, reason: &str) -> Result<TransitionOutcome, AppError> {
        self.transition(
            id,
            "execution_aborted",
            &[IncidentStatus::Processing],
            &[IncidentStatus::Failed],
            |cur, now| IncidentPatch {
                status: Some(IncidentStatus::Failed),
                report: Some(non_empty_or(reason, || {
                    format!("Remediation for {} was aborted.", cur.title)
                })),
                action_taken: Some(format!("Auto resolution aborted: {}", reason.trim())),
                execution_ref: Some(None),
                completed_at: Some(now.to_string()),
                ..IncidentPatch::default()
            },
        )
    }

    /// Operator resolution from `open`, `pending` or `manual_intervention_required`.
    pub fn manual_resolve(&self, id: &str) -> Result<TransitionOutcome, AppError> {
        self.transition(
            id,
            "manual_resolve",
            &[
                IncidentStatus::Open,
                IncidentStatus::Pending,
                IncidentStatus::ManualInterventionRequired,
            ],
            &[IncidentStatus::Resolved, IncidentStatus::Closed],
            |cur, now| IncidentPatch {
                status: Some(IncidentStatus::Resolved),
                action_status: Some(ActionStatus::Manual),
                report: cur
                    .report
                    .trim()
                    .is_empty()
                    .then(|| MANUAL_RESOLUTION_REPORT.to_string()),
                action_taken: Some(MANUAL_RESOLUTION_REPORT.to_string()),
                resolved_at: Some(now.to_string()),
                completed_at: Some(now.to_string()),
                ..IncidentPatch::default()
            },
        )
    }

    /// Archival `resolved → closed`.
    pub fn close(&self, id: &str) -> Result<TransitionOutcome, AppError> {
        self.transition(
            id,
            "close",
            &[IncidentStatus::Resolved],
            &[IncidentStatus::Closed],
            |_, _| IncidentPatch {
                status: Some(IncidentStatus::Closed),
                ..IncidentPatch::default()
            },
        )
    }

    /// Feed a finished plan back into the lifecycle.
    pub fn apply_plan_outcome(&self, id: &str, outcome: &PlanOutcome) -> Result<TransitionOutcome, AppError> {
        let report = outcome.report_text();
        let summary = Some(outcome.summary());
        match &outcome.verdict {
            PlanVerdict::Succeeded => self.remediation_succeeded(id, &report, summary),
            PlanVerdict::Failed { .. } => self.remediation_failed(id, &report, summary),
            PlanVerdict::ManualRequired => self.escalated(id, &report, summary),
            PlanVerdict::Aborted { reason } => self.execution_aborted(id, reason),
        }
    }

    /// Resolution callback from an external execution.
    pub fn apply_callback(&self, callback: &ResolutionCallback) -> Result<TransitionOutcome, AppError> {
        let id = callback.incident_id.as_str();
        let report = callback.report.as_str();
        match callback.outcome {
            ExecutionOutcome::Success => self.remediation_succeeded(
                id,
                report,
                Some(format!("Auto resolution completed: {}", report.trim())),
            ),
            ExecutionOutcome::Error => self.remediation_failed(
                id,
                report,
                Some(format!("Auto resolution failed: {}", report.trim())),
            ),
            ExecutionOutcome::ManualInterventionRequired => self.escalated(id, report, None),
            ExecutionOutcome::Unknown => self.execution_aborted(
                id,
                &non_empty_or(report, || "Execution reported an unrecognized outcome".to_string()),
            ),
        }
    }
}
