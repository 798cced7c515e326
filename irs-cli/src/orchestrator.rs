use irs_ai::embeddings::Embedder;
use irs_ai::feed::{build_feed_document, FeedDocument};
use irs_ai::llm::Llm;
use irs_ai::report::{ContentSource, ReportGenerator};
use irs_core::classify::{classify, Admission, FilterReason};
use irs_core::config::IrsSettings;
use irs_core::domain::{ActionStatus, Incident, IncidentStatus, TransitionRecord};
use irs_core::error::AppError;
use irs_core::ingress::{parse_request, AlarmEvent, IngressRequest, ManualActionRequest, OperatorAction, ResolutionCallback};
use irs_core::lifecycle::{apply_generated, decide_path, draft_incident, EntryPath, StateMachine, TransitionOutcome};
use irs_core::notify::{Delivery, Emitter, Notifier};
use irs_core::remediation::{ComputeApi, Dispatcher, PlanOutcome, RemediationPlan, RemoteExec, StrategySelector};
use irs_core::store::IncidentStore;
use serde::Serialize;
use serde_json::Value;

/// Collaborators constructed once at process start and passed in explicitly.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    pub store: &'a dyn IncidentStore,
    pub strategy: &'a dyn StrategySelector,
    pub compute: &'a dyn ComputeApi,
    pub exec: &'a dyn RemoteExec,
    pub notifier: &'a dyn Notifier,
    /// `None` means reports and suggestions always come from the canned fallback.
    pub llm: Option<&'a dyn Llm>,
    pub embedder: Option<&'a dyn Embedder>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentResult {
    /// Lifecycle status after the call; mirrors `incident.status`.
    pub status: IncidentStatus,
    pub incident: Incident,
    /// False when the request was a replay of an already satisfied transition.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Delivery>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "disposition")]
pub enum AlarmDisposition {
    Filtered {
        alarm_name: String,
        reason: FilterReason,
    },
    Created {
        path: EntryPath,
        report_source: ContentSource,
        result: Box<IncidentResult>,
    },
    /// Processing this alarm errored; the rest of the batch still ran.
    Failed {
        alarm_name: String,
        error: AppError,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "request")]
pub enum IngestOutcome {
    Alarms { alarms: Vec<AlarmDisposition> },
    Callback(IncidentResult),
    Action(IncidentResult),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentView {
    pub status: IncidentStatus,
    pub incident: Incident,
    pub transitions: Vec<TransitionRecord>,
    pub invariant_violations: Vec<String>,
}

/// Composes classification, lifecycle, remediation, reporting and notification.
pub struct Orchestrator<'a> {
    caps: Capabilities<'a>,
    settings: IrsSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(caps: Capabilities<'a>, settings: IrsSettings) -> Self {
        Self { caps, settings }
    }

    pub fn settings(&self) -> &IrsSettings {
        &self.settings
    }

    fn machine(&self) -> StateMachine<'a> {
        StateMachine::new(self.caps.store)
    }

    fn emitter(&self) -> Emitter<'a> {
        Emitter::new(
            self.caps.notifier,
            self.caps.store,
            self.settings.notify.action_base_url.clone(),
        )
    }

    fn generator(&self) -> ReportGenerator<'a> {
        match self.caps.llm {
            Some(llm) => ReportGenerator::new(Some(llm), self.settings.ai.model.clone()),
            None => ReportGenerator::fallback_only(),
        }
    }

    /// Publish for the incident's current status and return the record as last stored.
    fn notify(&self, incident: Incident) -> Result<(Incident, Delivery), AppError> {
        let delivery = self.emitter().emit(&incident);
        self.reread(incident, delivery)
    }

    fn reread(&self, incident: Incident, delivery: Delivery) -> Result<(Incident, Delivery), AppError> {
        let incident = if delivery.recorded {
            self.caps.store.get(&incident.id)?
        } else {
            incident
        };
        Ok((incident, delivery))
    }

    /// Notifies only when the transition actually wrote something; a replay stays silent.
    fn finish(&self, outcome: TransitionOutcome, plan: Option<PlanOutcome>) -> Result<IncidentResult, AppError> {
        let TransitionOutcome { incident, applied } = outcome;
        let (incident, notification) = if applied {
            let (incident, delivery) = self.notify(incident)?;
            (incident, Some(delivery))
        } else {
            (incident, None)
        };
        Ok(IncidentResult {
            status: incident.status,
            incident,
            applied,
            plan,
            notification,
        })
    }

    /// Single entry point for raw payloads: alarms, resolution callbacks and operator actions.
    pub fn ingest(&self, payload: &Value) -> Result<IngestOutcome, AppError> {
        match parse_request(payload)? {
            IngressRequest::Alarms(alarms) => {
                let mut out = Vec::with_capacity(alarms.len());
                for alarm in &alarms {
                    let disposition = self.ingest_alarm(alarm).unwrap_or_else(|error| {
                        tracing::error!(alarm_name = %alarm.name, "alarm processing failed: {error}");
                        AlarmDisposition::Failed {
                            alarm_name: alarm.name.clone(),
                            error,
                        }
                    });
                    out.push(disposition);
                }
                Ok(IngestOutcome::Alarms { alarms: out })
            }
            IngressRequest::Resolution(cb) => Ok(IngestOutcome::Callback(self.handle_callback(&cb)?)),
            IngressRequest::Action(req) => Ok(IngestOutcome::Action(self.handle_operator_action(&req)?)),
        }
    }

    pub fn ingest_alarm(&self, alarm: &AlarmEvent) -> Result<AlarmDisposition, AppError> {
        let classification = match classify(alarm, self.settings.classifier_policy()) {
            Admission::Admitted(c) => c,
            Admission::Filtered(reason) => {
                tracing::info!(alarm_name = %alarm.name, reason = ?reason, "alarm filtered");
                return Ok(AlarmDisposition::Filtered {
                    alarm_name: alarm.name.clone(),
                    reason,
                });
            }
        };

        let mut draft = draft_incident(alarm, &classification, &self.settings.intake.default_environment)?;
        let generated = self.generator().generate(&draft);
        apply_generated(&mut draft, &generated.report, generated.suggestions);

        let incident = self.machine().create(&draft)?;
        let plan = self.caps.strategy.plan_for(&incident);
        let path = decide_path(&incident, &plan, self.settings.intake.auto_remediate);
        tracing::info!(
            incident_id = %incident.id,
            path = ?path,
            plan = ?plan.names(),
            "entry path decided"
        );

        let result = match path {
            EntryPath::Auto => self.run_plan(&incident.id, ActionStatus::Auto, Some(plan))?,
            EntryPath::AwaitOperator => {
                let (incident, delivery) = self.notify(incident)?;
                IncidentResult {
                    status: incident.status,
                    incident,
                    applied: true,
                    plan: None,
                    notification: Some(delivery),
                }
            }
        };

        Ok(AlarmDisposition::Created {
            path,
            report_source: generated.report_source,
            result: Box::new(result),
        })
    }

    /// `open → processing`, run the plan, feed the outcome back, notify.
    fn run_plan(
        &self,
        id: &str,
        action_status: ActionStatus,
        plan: Option<RemediationPlan>,
    ) -> Result<IncidentResult, AppError> {
        let machine = self.machine();
        let begun = machine.begin_execution(id, action_status)?;
        let plan = plan.unwrap_or_else(|| self.caps.strategy.plan_for(&begun.incident));

        let dispatcher = Dispatcher::new(
            self.caps.compute,
            self.caps.exec,
            self.settings.remediation.clone(),
        );
        let outcome = dispatcher.execute(&begun.incident, &plan);
        let done = machine.apply_plan_outcome(id, &outcome)?;
        self.finish(done, Some(outcome))
    }

    pub fn dispatch_auto(&self, id: &str) -> Result<IncidentResult, AppError> {
        self.run_plan(id, ActionStatus::Auto, None)
    }

    /// Same plan as `dispatch_auto`, recorded as operator-driven.
    pub fn manual_escalate(&self, id: &str) -> Result<IncidentResult, AppError> {
        self.run_plan(id, ActionStatus::Manual, None)
    }

    pub fn handle_callback(&self, callback: &ResolutionCallback) -> Result<IncidentResult, AppError> {
        let outcome = self.machine().apply_callback(callback)?;
        self.finish(outcome, None)
    }

    pub fn handle_operator_action(&self, request: &ManualActionRequest) -> Result<IncidentResult, AppError> {
        tracing::info!(incident_id = %request.incident_id, action = ?request.action, "operator action");
        match request.action {
            OperatorAction::Manual => {
                let outcome = self.machine().manual_resolve(&request.incident_id)?;
                self.finish(outcome, None)
            }
            OperatorAction::Auto => self.dispatch_auto(&request.incident_id),
        }
    }

    /// Archival; subscribers already heard about the resolution.
    pub fn close(&self, id: &str) -> Result<IncidentResult, AppError> {
        let TransitionOutcome { incident, applied } = self.machine().close(id)?;
        Ok(IncidentResult {
            status: incident.status,
            incident,
            applied,
            plan: None,
            notification: None,
        })
    }

    pub fn retry_notification(&self, id: &str) -> Result<IncidentResult, AppError> {
        let incident = self.caps.store.get(id)?;
        let delivery = self.emitter().retry(&incident);
        let (incident, delivery) = self.reread(incident, delivery)?;
        Ok(IncidentResult {
            status: incident.status,
            incident,
            applied: delivery.recorded,
            plan: None,
            notification: Some(delivery),
        })
    }

    pub fn show(&self, id: &str) -> Result<IncidentView, AppError> {
        let incident = self.caps.store.get(id)?;
        let transitions = self.caps.store.transitions(id)?;
        Ok(IncidentView {
            status: incident.status,
            invariant_violations: incident.invariant_violations(),
            incident,
            transitions,
        })
    }

    pub fn list(&self, status: Option<IncidentStatus>) -> Result<Vec<Incident>, AppError> {
        self.caps.store.list(status)
    }

    pub fn feed(&self, id: &str) -> Result<FeedDocument, AppError> {
        let incident = self.caps.store.get(id)?;
        let embedder = self
            .caps
            .embedder
            .map(|e| (e, self.settings.ai.embedding_model.as_str()));
        build_feed_document(&incident, embedder)
    }
}
