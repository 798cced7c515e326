use irs_core::classify::{classify, Admission, ClassifierPolicy};
use irs_core::domain::{ActionStatus, Incident, IncidentPatch, IncidentStatus, IncidentType, Severity};
use irs_core::ingress::{AlarmEvent, Dimension, MetricMetadata};
use irs_core::lifecycle::draft_incident;
use irs_core::store::{IncidentStore, SqliteIncidentStore};
use pretty_assertions::assert_eq;

fn sample_incident(name: &str) -> Incident {
    let alarm = AlarmEvent {
        name: name.to_string(),
        reason: "Threshold Crossed".to_string(),
        new_state_value: "ALARM".to_string(),
        metric: MetricMetadata {
            metric_name: Some("CPUUtilization".to_string()),
            threshold: Some(80.0),
            ..MetricMetadata::default()
        },
        dimensions: vec![Dimension {
            name: "InstanceId".to_string(),
            value: "i-0abc".to_string(),
        }],
        ..AlarmEvent::default()
    };
    let c = match classify(&alarm, ClassifierPolicy::default()) {
        Admission::Admitted(c) => c,
        other => panic!("not admitted: {other:?}"),
    };
    draft_incident(&alarm, &c, "production").expect("draft")
}

#[test]
fn create_then_get_round_trips_every_field() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let incident = sample_incident("cpu_high-prod");

    let id = store.create(&incident).expect("create");
    assert_eq!(id, incident.id);

    let loaded = store.get(&id).expect("get");
    assert_eq!(loaded, incident);
    assert_eq!(loaded.incident_type, IncidentType::CpuHigh);
    assert_eq!(loaded.severity, Severity::High);
    assert!(loaded.tags.contains(&"cloudwatch-auto".to_string()));
}

#[test]
fn get_missing_incident_is_not_found() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let err = store.get("INC-missing").expect_err("should fail");
    assert!(err.is_not_found());
    assert!(!err.retryable);
}

#[test]
fn create_rejects_non_open_and_duplicate_ids() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let mut incident = sample_incident("cpu_high-prod");
    store.create(&incident).expect("create");

    let err = store.create(&incident).expect_err("duplicate");
    assert_eq!(err.code, "DB_CONFLICT");

    incident.id = "INC-other".to_string();
    incident.status = IncidentStatus::Resolved;
    let err = store.create(&incident).expect_err("non-open");
    assert_eq!(err.code, "LIFECYCLE_INVALID_INITIAL_STATE");
}

#[test]
fn conditional_update_applies_only_when_status_matches() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let incident = sample_incident("cpu_high-prod");
    store.create(&incident).expect("create");

    let patch = IncidentPatch {
        status: Some(IncidentStatus::Processing),
        execution_ref: Some(Some("exec-1".to_string())),
        reason: Some("begin_execution".to_string()),
        ..IncidentPatch::default()
    };
    let updated = store
        .conditional_update(&incident.id, IncidentStatus::Open, &patch)
        .expect("update");
    assert_eq!(updated.status, IncidentStatus::Processing);
    assert_eq!(updated.execution_ref.as_deref(), Some("exec-1"));
    assert_eq!(updated.created_at, incident.created_at);

    let err = store
        .conditional_update(&incident.id, IncidentStatus::Open, &patch)
        .expect_err("stale");
    assert!(err.is_stale());
    assert_eq!(
        err.details.as_deref(),
        Some(format!("incident_id={}; expected=open; actual=processing", incident.id).as_str())
    );

    let err = store
        .conditional_update("INC-missing", IncidentStatus::Open, &patch)
        .expect_err("missing");
    assert!(err.is_not_found());
}

#[test]
fn double_option_fields_clear_and_resolved_at_is_write_once() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let incident = sample_incident("cpu_high-prod");
    store.create(&incident).expect("create");

    store
        .conditional_update(
            &incident.id,
            IncidentStatus::Open,
            &IncidentPatch {
                status: Some(IncidentStatus::Processing),
                execution_ref: Some(Some("exec-1".to_string())),
                ..IncidentPatch::default()
            },
        )
        .expect("begin");

    let resolved = store
        .conditional_update(
            &incident.id,
            IncidentStatus::Processing,
            &IncidentPatch {
                status: Some(IncidentStatus::Resolved),
                action_status: Some(ActionStatus::Auto),
                execution_ref: Some(None),
                resolved_at: Some("2026-03-01T10:00:00Z".to_string()),
                ..IncidentPatch::default()
            },
        )
        .expect("resolve");
    assert_eq!(resolved.execution_ref, None);
    assert_eq!(resolved.resolved_at.as_deref(), Some("2026-03-01T10:00:00Z"));

    let again = store
        .conditional_update(
            &incident.id,
            IncidentStatus::Resolved,
            &IncidentPatch {
                resolved_at: Some("2030-01-01T00:00:00Z".to_string()),
                email_sent: Some(true),
                ..IncidentPatch::default()
            },
        )
        .expect("audit update");
    assert_eq!(again.resolved_at.as_deref(), Some("2026-03-01T10:00:00Z"));
    assert!(again.email_sent);
}

#[test]
fn status_changes_are_logged_in_order() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let incident = sample_incident("cpu_high-prod");
    store.create(&incident).expect("create");

    store
        .conditional_update(
            &incident.id,
            IncidentStatus::Open,
            &IncidentPatch {
                status: Some(IncidentStatus::Processing),
                execution_ref: Some(Some("exec-1".to_string())),
                reason: Some("begin_execution".to_string()),
                ..IncidentPatch::default()
            },
        )
        .expect("begin");
    // Audit-only write: no transition row.
    store
        .conditional_update(
            &incident.id,
            IncidentStatus::Processing,
            &IncidentPatch {
                email_sent: Some(false),
                ..IncidentPatch::default()
            },
        )
        .expect("audit");
    store
        .conditional_update(
            &incident.id,
            IncidentStatus::Processing,
            &IncidentPatch {
                status: Some(IncidentStatus::Pending),
                execution_ref: Some(None),
                ..IncidentPatch::default()
            },
        )
        .expect("fail");

    let log = store.transitions(&incident.id).expect("transitions");
    let pairs: Vec<(IncidentStatus, IncidentStatus, String)> = log
        .into_iter()
        .map(|t| (t.from_status, t.to_status, t.reason))
        .collect();
    assert_eq!(
        pairs,
        vec![
            (IncidentStatus::Open, IncidentStatus::Processing, "begin_execution".to_string()),
            (IncidentStatus::Processing, IncidentStatus::Pending, "unspecified".to_string()),
        ]
    );
}

#[test]
fn list_filters_by_status() {
    let store = SqliteIncidentStore::open_in_memory().expect("open");
    let a = sample_incident("cpu_high-a");
    let b = sample_incident("cpu_high-b");
    store.create(&a).expect("a");
    store.create(&b).expect("b");
    store
        .conditional_update(
            &b.id,
            IncidentStatus::Open,
            &IncidentPatch {
                status: Some(IncidentStatus::Processing),
                execution_ref: Some(Some("exec-b".to_string())),
                ..IncidentPatch::default()
            },
        )
        .expect("begin b");

    assert_eq!(store.list(None).expect("all").len(), 2);
    let open = store.list(Some(IncidentStatus::Open)).expect("open");
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, a.id);
}
