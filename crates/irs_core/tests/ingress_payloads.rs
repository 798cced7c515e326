use irs_core::ingress::{
    parse_alarm_payload, parse_request, ExecutionOutcome, IngressRequest, OperatorAction,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn cloudwatch_alarm(name: &str, state: &str) -> serde_json::Value {
    json!({
        "AlarmName": name,
        "AlarmDescription": "CPU above threshold",
        "NewStateValue": state,
        "NewStateReason": "Threshold Crossed: 1 datapoint [97.0] was greater than the threshold (95.0).",
        "StateChangeTime": "2026-03-01T10:00:00.000+0000",
        "Trigger": {
            "MetricName": "CPUUtilization",
            "Namespace": "AWS/EC2",
            "Statistic": "AVERAGE",
            "Threshold": 95.0,
            "ComparisonOperator": "GreaterThanThreshold",
            "EvaluationPeriods": 1,
            "Period": 300,
            "Dimensions": [{"name": "InstanceId", "value": "i-0abc"}]
        }
    })
}

#[test]
fn sns_envelope_unwraps_alarm_message_and_subject() {
    let payload = json!({
        "Records": [
            {"Sns": {
                "Subject": "ALARM: \"cpu_high-prod\"",
                "Message": cloudwatch_alarm("cpu_high-prod", "ALARM").to_string()
            }},
            {"Sns": {"Subject": "garbage", "Message": "not json"}}
        ]
    });
    let alarms = parse_alarm_payload(&payload).expect("parse");
    assert_eq!(alarms.len(), 1);

    let a = &alarms[0];
    assert_eq!(a.name, "cpu_high-prod");
    assert_eq!(a.subject, "ALARM: \"cpu_high-prod\"");
    assert_eq!(a.description, "CPU above threshold");
    assert!(a.is_alarm_state());
    assert_eq!(a.metric.threshold, Some(95.0));
    assert_eq!(a.metric.metric_name.as_deref(), Some("CPUUtilization"));
    assert_eq!(a.metric.period, Some(300));
    assert_eq!(a.dimensions.len(), 1);
    assert_eq!(a.dimensions[0].value, "i-0abc");
}

#[test]
fn bare_cloudwatch_alarm_is_accepted() {
    let alarms = parse_alarm_payload(&cloudwatch_alarm("mem_high-prod", "OK")).expect("parse");
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0].name, "mem_high-prod");
    assert!(!alarms[0].is_alarm_state());
}

#[test]
fn eventbridge_state_change_is_accepted() {
    let payload = json!({
        "source": "aws.cloudwatch",
        "detail-type": "CloudWatch Alarm State Change",
        "detail": {
            "alarmName": "app_crash-web",
            "metricName": "ProcessCount",
            "threshold": 1.0,
            "dimensions": [{"Name": "InstanceId", "Value": "i-0web"}],
            "state": {"value": "ALARM", "reason": "process exited", "timestamp": "2026-03-01T10:00:00Z"}
        }
    });
    let alarms = parse_alarm_payload(&payload).expect("parse");
    assert_eq!(alarms.len(), 1);
    let a = &alarms[0];
    assert_eq!(a.name, "app_crash-web");
    assert_eq!(a.reason, "process exited");
    assert_eq!(a.state_change_time.as_deref(), Some("2026-03-01T10:00:00Z"));
    assert_eq!(a.dimensions[0].name, "InstanceId");
    assert_eq!(a.dimensions[0].value, "i-0web");
    assert_eq!(a.threshold(), 1.0);
}

#[test]
fn unrecognized_payload_is_an_error() {
    let err = parse_alarm_payload(&json!({"hello": "world"})).expect_err("should fail");
    assert_eq!(err.code, "INGRESS_UNRECOGNIZED_PAYLOAD");
}

#[test]
fn request_dispatch_resolves_each_surface() {
    match parse_request(&json!({"incidentId": "INC-1", "outcome": "success", "report": "ok"}))
        .expect("callback")
    {
        IngressRequest::Resolution(cb) => {
            assert_eq!(cb.incident_id, "INC-1");
            assert_eq!(cb.outcome, ExecutionOutcome::Success);
            assert_eq!(cb.report, "ok");
        }
        other => panic!("unexpected {other:?}"),
    }

    match parse_request(&json!({"incidentId": "INC-2", "action": "manual"})).expect("action") {
        IngressRequest::Action(a) => {
            assert_eq!(a.incident_id, "INC-2");
            assert_eq!(a.action, OperatorAction::Manual);
        }
        other => panic!("unexpected {other:?}"),
    }

    match parse_request(&cloudwatch_alarm("cpu_high-prod", "ALARM")).expect("alarm") {
        IngressRequest::Alarms(alarms) => assert_eq!(alarms.len(), 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn action_request_requires_incident_id() {
    let err = parse_request(&json!({"incidentId": " ", "action": "auto"})).expect_err("should fail");
    assert_eq!(err.code, "INGRESS_MISSING_ID");
}

#[test]
fn outcome_strings_map_to_variants() {
    assert_eq!(ExecutionOutcome::parse("error"), ExecutionOutcome::Error);
    assert_eq!(
        ExecutionOutcome::parse("manual_intervention_required"),
        ExecutionOutcome::ManualInterventionRequired
    );
    assert_eq!(ExecutionOutcome::parse("TIMEOUT"), ExecutionOutcome::Unknown);
}
