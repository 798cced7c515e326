//! Ingress boundary: every payload shape is resolved here, once, into a canonical
//! request. Nothing downstream inspects raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

pub const ALARM_STATE: &str = "ALARM";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricMetadata {
    pub metric_name: Option<String>,
    pub namespace: Option<String>,
    pub statistic: Option<String>,
    pub threshold: Option<f64>,
    pub comparison_operator: Option<String>,
    pub evaluation_periods: Option<i64>,
    pub period: Option<i64>,
}

/// Canonical alarm shape consumed by the classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlarmEvent {
    pub name: String,
    /// Subject line of the carrying notification, when the alarm arrived wrapped in one.
    pub subject: String,
    pub description: String,
    pub reason: String,
    pub new_state_value: String,
    pub state_change_time: Option<String>,
    pub metric: MetricMetadata,
    pub dimensions: Vec<Dimension>,
}

impl AlarmEvent {
    pub fn is_alarm_state(&self) -> bool {
        self.new_state_value == ALARM_STATE
    }

    pub fn threshold(&self) -> f64 {
        self.metric.threshold.unwrap_or(0.0)
    }
}

/// Outcome reported by an external execution for the resolution callback surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    Error,
    ManualInterventionRequired,
    #[serde(other)]
    Unknown,
}

impl ExecutionOutcome {
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "error" => Self::Error,
            "manual_intervention_required" => Self::ManualInterventionRequired,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCallback {
    pub incident_id: String,
    pub outcome: ExecutionOutcome,
    #[serde(default)]
    pub report: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperatorAction {
    Manual,
    Auto,
}

impl OperatorAction {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(AppError::new(
                "INGRESS_INVALID_ACTION",
                "Invalid action. Must be \"manual\" or \"auto\"",
            )
            .with_details(format!("action={other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManualActionRequest {
    pub incident_id: String,
    pub action: OperatorAction,
}

/// Every entry point into the core, as one discriminated type.
#[derive(Debug, Clone, PartialEq)]
pub enum IngressRequest {
    Alarms(Vec<AlarmEvent>),
    Resolution(ResolutionCallback),
    Action(ManualActionRequest),
}

// CloudWatch alarm body as delivered inside SNS messages.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CloudWatchAlarm {
    #[serde(rename = "AlarmName")]
    alarm_name: String,
    #[serde(rename = "AlarmDescription")]
    alarm_description: Option<String>,
    #[serde(rename = "NewStateReason")]
    new_state_reason: String,
    #[serde(rename = "NewStateValue")]
    new_state_value: String,
    #[serde(rename = "StateChangeTime")]
    state_change_time: Option<String>,
    #[serde(rename = "Trigger")]
    trigger: CloudWatchTrigger,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CloudWatchTrigger {
    #[serde(rename = "MetricName")]
    metric_name: Option<String>,
    #[serde(rename = "Namespace")]
    namespace: Option<String>,
    #[serde(rename = "Statistic")]
    statistic: Option<String>,
    #[serde(rename = "Threshold")]
    threshold: Option<f64>,
    #[serde(rename = "ComparisonOperator")]
    comparison_operator: Option<String>,
    #[serde(rename = "EvaluationPeriods")]
    evaluation_periods: Option<i64>,
    #[serde(rename = "Period")]
    period: Option<i64>,
    #[serde(rename = "Dimensions")]
    dimensions: Vec<RawDimension>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDimension {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Value")]
    value: String,
}

// EventBridge "CloudWatch Alarm State Change" detail, flattened to what is consumed.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EventBridgeDetail {
    alarm_name: String,
    reason: String,
    metric_name: Option<String>,
    threshold: Option<f64>,
    dimensions: Vec<RawDimension>,
    state: EventBridgeState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventBridgeState {
    value: String,
    reason: Option<String>,
    timestamp: Option<String>,
}

fn convert_dimensions(raw: Vec<RawDimension>) -> Vec<Dimension> {
    raw.into_iter()
        .filter(|d| !d.name.is_empty())
        .map(|d| Dimension {
            name: d.name,
            value: d.value,
        })
        .collect()
}

fn from_cloudwatch(alarm: CloudWatchAlarm, subject: &str) -> AlarmEvent {
    let t = alarm.trigger;
    AlarmEvent {
        name: alarm.alarm_name,
        subject: subject.to_string(),
        description: alarm.alarm_description.unwrap_or_default(),
        reason: alarm.new_state_reason,
        new_state_value: alarm.new_state_value,
        state_change_time: alarm.state_change_time,
        metric: MetricMetadata {
            metric_name: t.metric_name,
            namespace: t.namespace,
            statistic: t.statistic,
            threshold: t.threshold,
            comparison_operator: t.comparison_operator,
            evaluation_periods: t.evaluation_periods,
            period: t.period,
        },
        dimensions: convert_dimensions(t.dimensions),
    }
}

fn from_eventbridge(detail: EventBridgeDetail) -> AlarmEvent {
    let reason = if detail.reason.is_empty() {
        detail.state.reason.unwrap_or_default()
    } else {
        detail.reason
    };
    AlarmEvent {
        name: detail.alarm_name,
        subject: String::new(),
        description: String::new(),
        reason,
        new_state_value: detail.state.value,
        state_change_time: detail.state.timestamp,
        metric: MetricMetadata {
            metric_name: detail.metric_name,
            threshold: detail.threshold,
            ..MetricMetadata::default()
        },
        dimensions: convert_dimensions(detail.dimensions),
    }
}

fn invalid_payload(message: &str, e: impl ToString) -> AppError {
    AppError::new("INGRESS_INVALID_PAYLOAD", message.to_string()).with_details(e.to_string())
}

/// Parse an alarm payload in any supported envelope:
/// - SNS records wrapping a CloudWatch alarm JSON string,
/// - an EventBridge event with `source == "aws.cloudwatch"`,
/// - a bare CloudWatch alarm object.
///
/// SNS records whose message is not valid JSON are skipped with a warning; one bad record
/// does not discard its siblings.
pub fn parse_alarm_payload(payload: &Value) -> Result<Vec<AlarmEvent>, AppError> {
    if let Some(records) = payload.get("Records").and_then(Value::as_array) {
        let mut out = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let sns = record.get("Sns").cloned().unwrap_or(Value::Null);
            let subject = sns.get("Subject").and_then(Value::as_str).unwrap_or("");
            let message = sns.get("Message").and_then(Value::as_str).unwrap_or("{}");
            match serde_json::from_str::<CloudWatchAlarm>(message) {
                Ok(alarm) => out.push(from_cloudwatch(alarm, subject)),
                Err(e) => {
                    tracing::warn!(record = idx, error = %e, "skipping unparseable alarm message");
                }
            }
        }
        return Ok(out);
    }

    if payload.get("source").and_then(Value::as_str) == Some("aws.cloudwatch") {
        let detail = payload
            .get("detail")
            .cloned()
            .ok_or_else(|| invalid_payload("EventBridge event is missing detail", "detail=null"))?;
        let detail: EventBridgeDetail = serde_json::from_value(detail)
            .map_err(|e| invalid_payload("Failed to decode EventBridge alarm detail", e))?;
        return Ok(vec![from_eventbridge(detail)]);
    }

    if payload.get("AlarmName").is_some() {
        let alarm: CloudWatchAlarm = serde_json::from_value(payload.clone())
            .map_err(|e| invalid_payload("Failed to decode CloudWatch alarm", e))?;
        return Ok(vec![from_cloudwatch(alarm, "")]);
    }

    Err(AppError::new(
        "INGRESS_UNRECOGNIZED_PAYLOAD",
        "Payload is not a recognized alarm envelope",
    ))
}

/// Resolve any inbound payload into one `IngressRequest`.
///
/// Callback and action payloads are recognized by their `incidentId` plus `outcome` or
/// `action` fields; anything else is treated as an alarm envelope.
pub fn parse_request(payload: &Value) -> Result<IngressRequest, AppError> {
    let has = |k: &str| payload.get(k).is_some();
    if has("incidentId") && has("outcome") {
        let cb: ResolutionCallback = serde_json::from_value(payload.clone())
            .map_err(|e| invalid_payload("Failed to decode resolution callback", e))?;
        return Ok(IngressRequest::Resolution(cb));
    }
    if has("incidentId") && has("action") {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_payload("action must be a string", "action=?"))?;
        let incident_id = payload
            .get("incidentId")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::new("INGRESS_MISSING_ID", "Missing required parameter: incidentId")
            })?;
        return Ok(IngressRequest::Action(ManualActionRequest {
            incident_id: incident_id.to_string(),
            action: OperatorAction::parse(action)?,
        }));
    }
    parse_alarm_payload(payload).map(IngressRequest::Alarms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_callback_outcome_does_not_fail_decoding() {
        let cb: ResolutionCallback = serde_json::from_value(json!({
            "incidentId": "INC-1",
            "outcome": "timed_out",
        }))
        .expect("decode");
        assert_eq!(cb.outcome, ExecutionOutcome::Unknown);
        assert!(cb.report.is_empty());
    }

    #[test]
    fn action_request_rejects_unknown_action() {
        let err = parse_request(&json!({"incidentId": "INC-1", "action": "reboot"}))
            .expect_err("should fail");
        assert_eq!(err.code, "INGRESS_INVALID_ACTION");
    }
}
