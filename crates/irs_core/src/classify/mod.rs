//! Alarm classification. Pure functions only; no I/O and no hidden state.

use serde::{Deserialize, Serialize};

use crate::domain::{Category, IncidentType, Severity, UNKNOWN_RESOURCE};
use crate::ingress::{AlarmEvent, Dimension};

const RESOURCE_DIMENSIONS: [&str; 2] = ["InstanceId", "Instance"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub category: Category,
    pub resource_ref: String,
}

/// Why an alarm was dropped. Admission filtering is expected traffic, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum FilterReason {
    NotInAlarmState(String),
    NotAllowListed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted(Classification),
    Filtered(FilterReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    /// Admit alarms matching no known keyword as `OTHER` instead of dropping them.
    pub admit_other: bool,
}

/// Upper-cased words of the text, split on every non-alphanumeric separator and on
/// CamelCase boundaries: "HighRAMUsage" yields HIGH, RAM and USAGE.
fn words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for chunk in text.split(|c: char| !c.is_ascii_alphanumeric()).filter(|t| !t.is_empty()) {
        let chars: Vec<char> = chunk.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if c.is_ascii_uppercase() => {
                    p.is_ascii_lowercase()
                        || p.is_ascii_digit()
                        || (p.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase()))
                }
                _ => false,
            };
            if boundary && !current.is_empty() {
                out.push(std::mem::take(&mut current).to_ascii_uppercase());
            }
            current.push(c);
        }
        if !current.is_empty() {
            out.push(current.to_ascii_uppercase());
        }
    }
    out
}

struct Matcher {
    upper: String,
    words: Vec<String>,
}

impl Matcher {
    fn new(text: &str) -> Self {
        Self {
            upper: text.to_ascii_uppercase(),
            words: words(text),
        }
    }

    /// Case-insensitive substring match anywhere in the text.
    fn any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.upper.contains(k))
    }

    /// Whole-word match, for keywords short enough to hide inside other words.
    fn any_word(&self, keywords: &[&str]) -> bool {
        self.words.iter().any(|w| keywords.contains(&w.as_str()))
    }
}

/// Identify the incident type from the alarm's name, subject and description.
///
/// Priority is fixed: CPU, memory, crash, error, shutdown. The first match wins, so one
/// alarm can never produce two types. Returns `None` when nothing matches.
pub fn identify_incident_type(name: &str, subject: &str, description: &str) -> Option<IncidentType> {
    let m = Matcher::new(&format!("{name} {subject} {description}"));
    let app = m.any(&["APP"]);

    if m.any(&["CPU", "PROCESSOR"]) {
        Some(IncidentType::CpuHigh)
    } else if m.any(&["MEMORY", "MEM"]) || m.any_word(&["RAM"]) {
        Some(IncidentType::MemHigh)
    } else if app && m.any(&["CRASH"]) {
        Some(IncidentType::AppCrash)
    } else if app && m.any(&["ERROR", "EXCEPTION", "FAIL"]) {
        Some(IncidentType::AppError)
    } else if app && m.any(&["SHUTDOWN", "STOP", "DOWN"]) {
        Some(IncidentType::AppShutdown)
    } else {
        None
    }
}

/// Severity is a pure function of `(incident_type, threshold)`.
pub fn derive_severity(incident_type: IncidentType, threshold: f64) -> Severity {
    match incident_type {
        IncidentType::AppCrash | IncidentType::AppShutdown => Severity::Critical,
        IncidentType::CpuHigh | IncidentType::MemHigh => {
            if threshold >= 90.0 {
                Severity::Critical
            } else if threshold >= 70.0 {
                Severity::High
            } else {
                Severity::Medium
            }
        }
        IncidentType::AppError => Severity::High,
        IncidentType::Other => Severity::Medium,
    }
}

pub fn category_for(incident_type: IncidentType) -> Category {
    match incident_type {
        IncidentType::CpuHigh | IncidentType::MemHigh => Category::Infrastructure,
        IncidentType::AppCrash | IncidentType::AppShutdown | IncidentType::AppError => {
            Category::Application
        }
        IncidentType::Other => Category::Other,
    }
}

/// First dimension naming an instance; `"unknown"` when absent or blank.
pub fn extract_resource_ref(dimensions: &[Dimension]) -> String {
    dimensions
        .iter()
        .find(|d| RESOURCE_DIMENSIONS.contains(&d.name.as_str()) && !d.value.trim().is_empty())
        .map(|d| d.value.trim().to_string())
        .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string())
}

pub fn classify(alarm: &AlarmEvent, policy: ClassifierPolicy) -> Admission {
    if !alarm.is_alarm_state() {
        return Admission::Filtered(FilterReason::NotInAlarmState(
            alarm.new_state_value.clone(),
        ));
    }

    let incident_type = match identify_incident_type(&alarm.name, &alarm.subject, &alarm.description) {
        Some(t) => t,
        None if policy.admit_other => IncidentType::Other,
        None => {
            return Admission::Filtered(FilterReason::NotAllowListed(alarm.name.clone()));
        }
    };

    Admission::Admitted(Classification {
        incident_type,
        severity: derive_severity(incident_type, alarm.threshold()),
        category: category_for(incident_type),
        resource_ref: extract_resource_ref(&alarm.dimensions),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_does_not_match_inside_other_words() {
        assert_eq!(identify_incident_type("program-health", "", ""), None);
        assert_eq!(
            identify_incident_type("ram-pressure", "", ""),
            Some(IncidentType::MemHigh)
        );
        assert_eq!(
            identify_incident_type("HighRAMUsage", "", ""),
            Some(IncidentType::MemHigh)
        );
    }

    #[test]
    fn camel_case_names_split_into_words() {
        assert_eq!(words("HighRAMUsage"), ["HIGH", "RAM", "USAGE"]);
        assert_eq!(words("ec2-HighCPU_v2"), ["EC2", "HIGH", "CPU", "V2"]);
        assert_eq!(words("Program"), ["PROGRAM"]);
    }

    #[test]
    fn app_qualifier_is_required_for_application_types() {
        assert_eq!(identify_incident_type("worker crash", "", ""), None);
        assert_eq!(
            identify_incident_type("application crash loop", "", ""),
            Some(IncidentType::AppCrash)
        );
    }
}
