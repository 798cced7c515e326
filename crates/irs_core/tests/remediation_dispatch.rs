use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use irs_core::classify::{classify, Admission, ClassifierPolicy};
use irs_core::config::RemediationConfig;
use irs_core::domain::{Incident, IncidentType, Severity};
use irs_core::error::AppError;
use irs_core::ingress::{AlarmEvent, Dimension, MetricMetadata};
use irs_core::lifecycle::draft_incident;
use irs_core::remediation::{
    ActionOutcome, CommandOutput, ComputeApi, DefaultStrategy, Dispatcher, InstanceDescription,
    PlanVerdict, RemediationAction, RemediationPlan, RemoteExec, RemoteSession,
};
use pretty_assertions::assert_eq;

#[derive(Default)]
struct MockCompute {
    state: RefCell<String>,
    instance_type: RefCell<String>,
    fail_on: Option<&'static str>,
    calls: RefCell<Vec<String>>,
}

impl MockCompute {
    fn new(state: &str, instance_type: &str) -> Self {
        Self {
            state: RefCell::new(state.to_string()),
            instance_type: RefCell::new(instance_type.to_string()),
            ..Self::default()
        }
    }

    fn failing(mut self, step: &'static str) -> Self {
        self.fail_on = Some(step);
        self
    }

    fn step(&self, name: &str) -> Result<(), AppError> {
        self.calls.borrow_mut().push(name.to_string());
        if self.fail_on == Some(name) {
            return Err(AppError::unavailable("REMEDIATION_COMPUTE_UNAVAILABLE", format!("{name} failed")));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl ComputeApi for MockCompute {
    fn describe(&self, _resource_ref: &str) -> Result<InstanceDescription, AppError> {
        self.step("describe")?;
        Ok(InstanceDescription {
            state: self.state.borrow().clone(),
            instance_type: self.instance_type.borrow().clone(),
            private_ip: Some("10.0.0.5".to_string()),
            public_ip: None,
        })
    }

    fn stop(&self, _resource_ref: &str) -> Result<(), AppError> {
        self.step("stop")?;
        *self.state.borrow_mut() = "stopping".to_string();
        Ok(())
    }

    fn wait_stopped(&self, _resource_ref: &str, _timeout: Duration) -> Result<(), AppError> {
        self.step("wait_stopped")?;
        *self.state.borrow_mut() = "stopped".to_string();
        Ok(())
    }

    fn set_instance_type(&self, _resource_ref: &str, instance_type: &str) -> Result<(), AppError> {
        self.step("set_instance_type")?;
        *self.instance_type.borrow_mut() = instance_type.to_string();
        Ok(())
    }

    fn start(&self, _resource_ref: &str) -> Result<(), AppError> {
        self.step("start")?;
        *self.state.borrow_mut() = "running".to_string();
        Ok(())
    }
}

/// Scripted remote host: each command prefix maps to a canned output.
#[derive(Clone, Default)]
struct MockExec {
    script: Rc<HashMap<&'static str, CommandOutput>>,
    log: Rc<RefCell<Vec<String>>>,
    refuse: bool,
}

struct MockSession {
    script: Rc<HashMap<&'static str, CommandOutput>>,
    log: Rc<RefCell<Vec<String>>>,
    after_restart: bool,
}

fn out(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

impl MockExec {
    fn with(script: Vec<(&'static str, CommandOutput)>) -> Self {
        Self {
            script: Rc::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl RemoteExec for MockExec {
    fn connect(&self, _resource_ref: &str, _timeout: Duration) -> Result<Box<dyn RemoteSession>, AppError> {
        if self.refuse {
            return Err(AppError::unavailable("REMEDIATION_CONNECT_FAILED", "connection refused"));
        }
        Ok(Box::new(MockSession {
            script: Rc::clone(&self.script),
            log: Rc::clone(&self.log),
            after_restart: false,
        }))
    }
}

impl RemoteSession for MockSession {
    fn run(&mut self, command: &str) -> Result<CommandOutput, AppError> {
        self.log.borrow_mut().push(command.to_string());
        if command.starts_with("sudo systemctl restart") {
            self.after_restart = true;
        }
        let key = if command.starts_with("systemctl is-active") {
            if self.after_restart {
                "is-active-after"
            } else {
                "is-active-before"
            }
        } else if command.starts_with("systemctl list-units") {
            "list-units"
        } else if command.starts_with("sudo systemctl restart") {
            "restart"
        } else if command.starts_with("sudo journalctl") {
            "journal"
        } else {
            ""
        };
        Ok(self.script.get(key).cloned().unwrap_or_default())
    }
}

fn config() -> RemediationConfig {
    RemediationConfig {
        settle_delay_secs: 0,
        log_tail_chars: 12,
        ..RemediationConfig::default()
    }
}

fn incident(name: &str, instance: Option<&str>) -> Incident {
    let alarm = AlarmEvent {
        name: name.to_string(),
        new_state_value: "ALARM".to_string(),
        metric: MetricMetadata {
            threshold: Some(95.0),
            ..MetricMetadata::default()
        },
        dimensions: instance
            .map(|i| {
                vec![Dimension {
                    name: "InstanceId".to_string(),
                    value: i.to_string(),
                }]
            })
            .unwrap_or_default(),
        ..AlarmEvent::default()
    };
    let c = match classify(&alarm, ClassifierPolicy { admit_other: true }) {
        Admission::Admitted(c) => c,
        other => panic!("not admitted: {other:?}"),
    };
    draft_incident(&alarm, &c, "production").expect("draft")
}

fn healthy_service() -> MockExec {
    MockExec::with(vec![
        ("list-units", out("loadsim.service loaded active running Load simulator")),
        ("is-active-before", out("failed")),
        ("restart", out("")),
        ("is-active-after", out("active")),
        ("journal", out("line one\nline two\nStarted loadsim")),
    ])
}

#[test]
fn default_strategy_maps_types_to_plans() {
    let cases = [
        (IncidentType::CpuHigh, vec![RemediationAction::ResizeResource]),
        (IncidentType::MemHigh, vec![RemediationAction::ResizeResource]),
        (IncidentType::AppCrash, vec![RemediationAction::RestartService]),
        (IncidentType::AppShutdown, vec![RemediationAction::RestartService]),
        (IncidentType::AppError, vec![RemediationAction::RestartService]),
        (IncidentType::Other, vec![RemediationAction::EscalateManual]),
    ];
    for (t, expected) in cases {
        assert_eq!(DefaultStrategy::plan(t, Severity::Critical).actions, expected);
    }
    assert!(!DefaultStrategy::plan(IncidentType::Other, Severity::Critical).has_known_remedy());
}

#[test]
fn resize_of_running_resource_stops_resizes_and_restarts() {
    let compute = MockCompute::new("running", "t3.micro");
    let exec = MockExec::default();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("cpu_high-prod", Some("i-0abc"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::ResizeResource]));
    assert_eq!(outcome.verdict, PlanVerdict::Succeeded);
    assert_eq!(
        compute.calls(),
        vec!["describe", "stop", "wait_stopped", "set_instance_type", "start"]
    );
    assert_eq!(outcome.steps[0].was_running, Some(true));
    assert_eq!(*compute.instance_type.borrow(), "m5.large");
    assert!(outcome.summary().starts_with("Auto resolution completed"));
}

#[test]
fn resize_already_at_target_is_a_skip_and_counts_as_success() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = MockExec::default();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("cpu_high-prod", Some("i-0abc"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::ResizeResource]));
    assert_eq!(outcome.verdict, PlanVerdict::Succeeded);
    assert!(matches!(outcome.steps[0].outcome, ActionOutcome::Skip { .. }));
    assert_eq!(compute.calls(), vec!["describe"]);
}

#[test]
fn stopped_resource_is_resized_without_being_started() {
    let compute = MockCompute::new("stopped", "t3.micro");
    let exec = MockExec::default();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("mem_high-prod", Some("i-0abc"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::ResizeResource]));
    assert_eq!(outcome.verdict, PlanVerdict::Succeeded);
    assert_eq!(compute.calls(), vec!["describe", "set_instance_type"]);
    assert_eq!(outcome.steps[0].was_running, Some(false));
}

#[test]
fn resize_failure_reports_intermediate_state() {
    let compute = MockCompute::new("running", "t3.micro").failing("set_instance_type");
    let exec = MockExec::default();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("cpu_high-prod", Some("i-0abc"));

    let outcome = d.execute(
        &inc,
        &RemediationPlan::new(vec![
            RemediationAction::ResizeResource,
            RemediationAction::RestartService,
        ]),
    );
    assert_eq!(
        outcome.verdict,
        PlanVerdict::Failed {
            action: RemediationAction::ResizeResource,
            reason: "Failed to change instance type: [REMEDIATION_COMPUTE_UNAVAILABLE] set_instance_type failed"
                .to_string(),
            intermediate_state: Some("stopped but not resized".to_string()),
        }
    );
    // Short-circuit: the restart never ran.
    assert_eq!(outcome.steps.len(), 1);
    assert!(exec.commands().is_empty());
    assert!(outcome.report_text().contains("intermediate state: stopped but not resized"));
}

#[test]
fn unknown_resource_fails_without_touching_capabilities() {
    let compute = MockCompute::new("running", "t3.micro");
    let exec = MockExec::default();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("cpu_high-prod", None);

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::ResizeResource]));
    match outcome.verdict {
        PlanVerdict::Failed {
            intermediate_state, ..
        } => assert_eq!(intermediate_state, None),
        other => panic!("unexpected {other:?}"),
    }
    assert!(compute.calls().is_empty());
}

#[test]
fn restart_captures_states_and_bounded_log_tail() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = healthy_service();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("app_crash-web", Some("i-0web"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::RestartService]));
    assert_eq!(outcome.verdict, PlanVerdict::Succeeded);

    let step = &outcome.steps[0];
    assert_eq!(step.status_before.as_deref(), Some("failed"));
    assert_eq!(step.status_after.as_deref(), Some("active"));
    assert_eq!(step.recent_logs.as_deref(), Some("rted loadsim"));
    assert_eq!(
        exec.commands(),
        vec![
            "systemctl list-units --type=service --all | grep loadsim",
            "systemctl is-active loadsim",
            "sudo systemctl restart loadsim",
            "systemctl is-active loadsim",
            "sudo journalctl -u loadsim -n 5 --no-pager",
        ]
    );
}

#[test]
fn restart_of_absent_service_fails_before_any_mutation() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = MockExec::with(vec![("list-units", out(""))]);
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("app_crash-web", Some("i-0web"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::RestartService]));
    assert_eq!(
        outcome.verdict,
        PlanVerdict::Failed {
            action: RemediationAction::RestartService,
            reason: "Service loadsim not found".to_string(),
            intermediate_state: None,
        }
    );
    assert_eq!(exec.commands().len(), 1);
}

#[test]
fn restart_stderr_warning_is_tolerated_but_errors_fail() {
    let compute = MockCompute::new("running", "m5.large");
    let inc = incident("app_crash-web", Some("i-0web"));

    let mut warning = healthy_service();
    let mut script: HashMap<_, _> = (*warning.script).clone();
    script.insert(
        "restart",
        CommandOutput {
            stdout: String::new(),
            stderr: "Warning: The unit file changed on disk".to_string(),
            exit_code: Some(0),
        },
    );
    warning.script = Rc::new(script.clone());
    let d = Dispatcher::new(&compute, &warning, config());
    let ok = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::RestartService]));
    assert_eq!(ok.verdict, PlanVerdict::Succeeded);

    script.insert(
        "restart",
        CommandOutput {
            stdout: String::new(),
            stderr: "Failed to restart loadsim.service: Access denied".to_string(),
            exit_code: Some(1),
        },
    );
    let denied = MockExec {
        script: Rc::new(script),
        ..MockExec::default()
    };
    let d = Dispatcher::new(&compute, &denied, config());
    let bad = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::RestartService]));
    match bad.verdict {
        PlanVerdict::Failed {
            intermediate_state, ..
        } => assert_eq!(
            intermediate_state.as_deref(),
            Some("restart issued; service state unknown")
        ),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn service_not_active_after_restart_is_a_failure() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = MockExec::with(vec![
        ("list-units", out("loadsim.service loaded failed failed")),
        ("is-active-before", out("failed")),
        ("is-active-after", out("failed")),
        ("journal", out("crash loop")),
    ]);
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("app_crash-web", Some("i-0web"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::RestartService]));
    assert!(matches!(outcome.verdict, PlanVerdict::Failed { .. }));
    assert_eq!(outcome.steps[0].recent_logs.as_deref(), Some("crash loop"));
}

#[test]
fn connection_failure_is_an_action_failure() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = MockExec {
        refuse: true,
        ..MockExec::default()
    };
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("app_crash-web", Some("i-0web"));

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::RestartService]));
    match outcome.verdict {
        PlanVerdict::Failed { reason, .. } => assert!(reason.starts_with("Remote connection failed")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn escalation_and_empty_plans_require_manual_intervention() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = MockExec::default();
    let d = Dispatcher::new(&compute, &exec, config());
    let inc = incident("disk-latency", None);

    let outcome = d.execute(&inc, &RemediationPlan::new(vec![RemediationAction::EscalateManual]));
    assert_eq!(outcome.verdict, PlanVerdict::ManualRequired);
    assert!(compute.calls().is_empty());

    let empty = d.execute(&inc, &RemediationPlan::new(vec![]));
    assert_eq!(empty.verdict, PlanVerdict::ManualRequired);
    assert!(empty.steps.is_empty());
}

#[test]
fn deadline_is_checked_between_steps() {
    let compute = MockCompute::new("running", "m5.large");
    let exec = healthy_service();
    let d = Dispatcher::new(
        &compute,
        &exec,
        RemediationConfig {
            settle_delay_secs: 1,
            plan_deadline_secs: 1,
            ..config()
        },
    );
    let inc = incident("app_crash-web", Some("i-0web"));

    let outcome = d.execute(
        &inc,
        &RemediationPlan::new(vec![
            RemediationAction::RestartService,
            RemediationAction::ResizeResource,
        ]),
    );
    assert!(matches!(outcome.verdict, PlanVerdict::Aborted { .. }));
    assert_eq!(outcome.steps.len(), 1);
    assert!(compute.calls().is_empty());
}
