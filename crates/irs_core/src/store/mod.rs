use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::clock::now_rfc3339_utc;
use crate::db;
use crate::domain::{
    ActionStatus, Category, Incident, IncidentPatch, IncidentStatus, IncidentType, Severity,
    TransitionRecord,
};
use crate::error::AppError;

/// Durable incident storage. `conditional_update` is the only mutation path after creation:
/// it applies a patch only while the stored status equals `expected`, which serializes all
/// writers for one incident without in-process locks.
pub trait IncidentStore {
    fn create(&self, incident: &Incident) -> Result<String, AppError>;
    fn get(&self, id: &str) -> Result<Incident, AppError>;
    fn conditional_update(
        &self,
        id: &str,
        expected: IncidentStatus,
        patch: &IncidentPatch,
    ) -> Result<Incident, AppError>;
    fn list(&self, status: Option<IncidentStatus>) -> Result<Vec<Incident>, AppError>;
    fn transitions(&self, id: &str) -> Result<Vec<TransitionRecord>, AppError>;
}

const SELECT_INCIDENT: &str = r#"
  SELECT
    id, resource_ref, incident_type, severity, category, status, action_status,
    title, description, environment, reporter, alarm_name, metric_name, threshold, tags_json,
    report, suggestions_json, action_taken,
    email_sent, email_sent_at, notification_error,
    execution_ref,
    created_at, resolved_at, completed_at, updated_at
  FROM incidents
"#;

/// Raw column values; enum and JSON decoding happens outside the rusqlite closure so
/// failures surface as `AppError`s with the offending value.
struct IncidentRow {
    id: String,
    resource_ref: String,
    incident_type: String,
    severity: String,
    category: String,
    status: String,
    action_status: String,
    title: String,
    description: String,
    environment: String,
    reporter: String,
    alarm_name: String,
    metric_name: Option<String>,
    threshold: Option<f64>,
    tags_json: String,
    report: String,
    suggestions_json: String,
    action_taken: Option<String>,
    email_sent: bool,
    email_sent_at: Option<String>,
    notification_error: Option<String>,
    execution_ref: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
    completed_at: Option<String>,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRow> {
    Ok(IncidentRow {
        id: row.get(0)?,
        resource_ref: row.get(1)?,
        incident_type: row.get(2)?,
        severity: row.get(3)?,
        category: row.get(4)?,
        status: row.get(5)?,
        action_status: row.get(6)?,
        title: row.get(7)?,
        description: row.get(8)?,
        environment: row.get(9)?,
        reporter: row.get(10)?,
        alarm_name: row.get(11)?,
        metric_name: row.get(12)?,
        threshold: row.get(13)?,
        tags_json: row.get(14)?,
        report: row.get(15)?,
        suggestions_json: row.get(16)?,
        action_taken: row.get(17)?,
        email_sent: row.get(18)?,
        email_sent_at: row.get(19)?,
        notification_error: row.get(20)?,
        execution_ref: row.get(21)?,
        created_at: row.get(22)?,
        resolved_at: row.get(23)?,
        completed_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}

fn decode_err(field: &str, value: &str) -> AppError {
    AppError::new("DB_DECODE_FAILED", format!("Stored {field} is not recognized"))
        .with_details(format!("value={value}"))
}

fn decode_list(field: &str, json: &str) -> Result<Vec<String>, AppError> {
    serde_json::from_str(json).map_err(|e| {
        AppError::new("DB_DECODE_FAILED", format!("Stored {field} is not a string list"))
            .with_details(e.to_string())
    })
}

fn encode_list(field: &str, items: &[String]) -> Result<String, AppError> {
    serde_json::to_string(items).map_err(|e| {
        AppError::new("DB_ENCODE_FAILED", format!("Failed to encode {field}"))
            .with_details(e.to_string())
    })
}

impl TryFrom<IncidentRow> for Incident {
    type Error = AppError;

    fn try_from(r: IncidentRow) -> Result<Self, Self::Error> {
        Ok(Incident {
            incident_type: IncidentType::from_str(&r.incident_type)
                .ok_or_else(|| decode_err("incident_type", &r.incident_type))?,
            severity: Severity::from_str(&r.severity)
                .ok_or_else(|| decode_err("severity", &r.severity))?,
            category: Category::from_str(&r.category)
                .ok_or_else(|| decode_err("category", &r.category))?,
            status: IncidentStatus::from_str(&r.status)
                .ok_or_else(|| decode_err("status", &r.status))?,
            action_status: ActionStatus::from_str(&r.action_status)
                .ok_or_else(|| decode_err("action_status", &r.action_status))?,
            tags: decode_list("tags", &r.tags_json)?,
            suggestions: decode_list("suggestions", &r.suggestions_json)?,
            id: r.id,
            resource_ref: r.resource_ref,
            title: r.title,
            description: r.description,
            environment: r.environment,
            reporter: r.reporter,
            alarm_name: r.alarm_name,
            metric_name: r.metric_name,
            threshold: r.threshold,
            report: r.report,
            action_taken: r.action_taken,
            email_sent: r.email_sent,
            email_sent_at: r.email_sent_at,
            notification_error: r.notification_error,
            execution_ref: r.execution_ref,
            created_at: r.created_at,
            resolved_at: r.resolved_at,
            completed_at: r.completed_at,
            updated_at: r.updated_at,
        })
    }
}

fn load_incident(conn: &Connection, id: &str) -> Result<Option<Incident>, AppError> {
    let sql = format!("{SELECT_INCIDENT} WHERE id = ?1");
    let row = conn
        .query_row(&sql, [id], read_row)
        .optional()
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query incident").with_details(e.to_string())
        })?;
    row.map(Incident::try_from).transpose()
}

fn opt_text(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

/// SQLite-backed store. One connection per store; open one store per worker to get
/// independent writers against the same file.
pub struct SqliteIncidentStore {
    conn: Mutex<Connection>,
}

impl SqliteIncidentStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::new("DB_LOCK_POISONED", "Store connection lock was poisoned"))
    }

    fn build_update(
        patch: &IncidentPatch,
        now: &str,
    ) -> Result<(Vec<&'static str>, Vec<Value>), AppError> {
        let mut sets = vec!["updated_at = ?"];
        let mut values = vec![Value::Text(now.to_string())];

        if let Some(s) = patch.status {
            sets.push("status = ?");
            values.push(Value::Text(s.as_str().to_string()));
        }
        if let Some(a) = patch.action_status {
            sets.push("action_status = ?");
            values.push(Value::Text(a.as_str().to_string()));
        }
        if let Some(s) = patch.severity {
            sets.push("severity = ?");
            values.push(Value::Text(s.as_str().to_string()));
        }
        if let Some(r) = &patch.report {
            sets.push("report = ?");
            values.push(Value::Text(r.clone()));
        }
        if let Some(s) = &patch.suggestions {
            sets.push("suggestions_json = ?");
            values.push(Value::Text(encode_list("suggestions", s)?));
        }
        if let Some(a) = &patch.action_taken {
            sets.push("action_taken = ?");
            values.push(Value::Text(a.clone()));
        }
        if let Some(e) = &patch.execution_ref {
            sets.push("execution_ref = ?");
            values.push(opt_text(e));
        }
        if let Some(sent) = patch.email_sent {
            sets.push("email_sent = ?");
            values.push(Value::Integer(i64::from(sent)));
        }
        if let Some(at) = &patch.email_sent_at {
            sets.push("email_sent_at = ?");
            values.push(opt_text(at));
        }
        if let Some(err) = &patch.notification_error {
            sets.push("notification_error = ?");
            values.push(opt_text(err));
        }
        if let Some(at) = &patch.resolved_at {
            // Resolution timestamp is set exactly once.
            sets.push("resolved_at = COALESCE(resolved_at, ?)");
            values.push(Value::Text(at.clone()));
        }
        if let Some(at) = &patch.completed_at {
            sets.push("completed_at = ?");
            values.push(Value::Text(at.clone()));
        }
        Ok((sets, values))
    }
}

impl IncidentStore for SqliteIncidentStore {
    fn create(&self, incident: &Incident) -> Result<String, AppError> {
        if incident.status != IncidentStatus::Open {
            return Err(AppError::new(
                "LIFECYCLE_INVALID_INITIAL_STATE",
                "Incidents must be created in the open state",
            )
            .with_details(format!("status={}", incident.status.as_str())));
        }

        let conn = self.lock()?;
        conn.execute(
            r#"
      INSERT INTO incidents(
        id, resource_ref, incident_type, severity, category, status, action_status,
        title, description, environment, reporter, alarm_name, metric_name, threshold, tags_json,
        report, suggestions_json, action_taken,
        email_sent, email_sent_at, notification_error,
        execution_ref,
        created_at, resolved_at, completed_at, updated_at
      ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7,
        ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
        ?16, ?17, ?18,
        ?19, ?20, ?21,
        ?22,
        ?23, ?24, ?25, ?26
      )
      "#,
            params![
                incident.id,
                incident.resource_ref,
                incident.incident_type.as_str(),
                incident.severity.as_str(),
                incident.category.as_str(),
                incident.status.as_str(),
                incident.action_status.as_str(),
                incident.title,
                incident.description,
                incident.environment,
                incident.reporter,
                incident.alarm_name,
                incident.metric_name,
                incident.threshold,
                encode_list("tags", &incident.tags)?,
                incident.report,
                encode_list("suggestions", &incident.suggestions)?,
                incident.action_taken,
                incident.email_sent,
                incident.email_sent_at,
                incident.notification_error,
                incident.execution_ref,
                incident.created_at,
                incident.resolved_at,
                incident.completed_at,
                incident.updated_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::new("DB_CONFLICT", "Incident id already exists")
                    .with_details(format!("incident_id={}", incident.id))
            }
            other => AppError::new("DB_INSERT_FAILED", "Failed to insert incident")
                .with_details(other.to_string())
                .with_retryable(true),
        })?;

        Ok(incident.id.clone())
    }

    fn get(&self, id: &str) -> Result<Incident, AppError> {
        let conn = self.lock()?;
        load_incident(&conn, id)?.ok_or_else(|| AppError::not_found(id))
    }

    fn conditional_update(
        &self,
        id: &str,
        expected: IncidentStatus,
        patch: &IncidentPatch,
    ) -> Result<Incident, AppError> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so the status read and the write are atomic
        // against other connections to the same file.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                AppError::new("DB_TX_FAILED", "Failed to start update transaction")
                    .with_details(e.to_string())
                    .with_retryable(true)
            })?;

        let current: Option<String> = tx
            .query_row("SELECT status FROM incidents WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to read incident status")
                    .with_details(e.to_string())
            })?;
        let Some(current) = current else {
            return Err(AppError::not_found(id));
        };
        if current != expected.as_str() {
            return Err(AppError::stale_transition(id, expected.as_str(), &current));
        }

        let now = now_rfc3339_utc()?;
        let (sets, mut values) = Self::build_update(patch, &now)?;
        values.push(Value::Text(id.to_string()));
        values.push(Value::Text(expected.as_str().to_string()));

        let sql = format!(
            "UPDATE incidents SET {} WHERE id = ? AND status = ?",
            sets.join(", ")
        );
        let changed = tx
            .execute(&sql, rusqlite::params_from_iter(values.iter()))
            .map_err(|e| {
                AppError::new("DB_UPDATE_FAILED", "Failed to update incident")
                    .with_details(e.to_string())
                    .with_retryable(true)
            })?;
        if changed != 1 {
            return Err(AppError::stale_transition(id, expected.as_str(), &current));
        }

        if let Some(to) = patch.status.filter(|to| *to != expected) {
            tx.execute(
                "INSERT INTO incident_transitions(incident_id, from_status, to_status, reason, at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    expected.as_str(),
                    to.as_str(),
                    patch.reason.as_deref().unwrap_or("unspecified"),
                    now
                ],
            )
            .map_err(|e| {
                AppError::new("DB_UPDATE_FAILED", "Failed to record transition")
                    .with_details(e.to_string())
            })?;
        }

        let updated = load_incident(&tx, id)?.ok_or_else(|| AppError::not_found(id))?;
        tx.commit().map_err(|e| {
            AppError::new("DB_TX_FAILED", "Failed to commit incident update")
                .with_details(e.to_string())
                .with_retryable(true)
        })?;
        Ok(updated)
    }

    fn list(&self, status: Option<IncidentStatus>) -> Result<Vec<Incident>, AppError> {
        let conn = self.lock()?;
        let (sql, filter) = match status {
            Some(s) => (
                format!("{SELECT_INCIDENT} WHERE status = ?1 ORDER BY id ASC"),
                vec![Value::Text(s.as_str().to_string())],
            ),
            None => (format!("{SELECT_INCIDENT} ORDER BY id ASC"), Vec::new()),
        };
        let mut stmt = conn.prepare(&sql).map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare incidents query")
                .with_details(e.to_string())
        })?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(filter.iter()), read_row)
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query incidents")
                    .with_details(e.to_string())
            })?;

        let mut out = Vec::new();
        for r in rows {
            let row = r.map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to decode incident row")
                    .with_details(e.to_string())
            })?;
            out.push(Incident::try_from(row)?);
        }
        Ok(out)
    }

    fn transitions(&self, id: &str) -> Result<Vec<TransitionRecord>, AppError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
      SELECT incident_id, from_status, to_status, reason, at
      FROM incident_transitions
      WHERE incident_id = ?1
      ORDER BY id ASC
      "#,
            )
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to prepare transitions query")
                    .with_details(e.to_string())
            })?;
        let rows = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query transitions")
                    .with_details(e.to_string())
            })?;

        let mut out = Vec::new();
        for r in rows {
            let (incident_id, from, to, reason, at) = r.map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to decode transition row")
                    .with_details(e.to_string())
            })?;
            out.push(TransitionRecord {
                incident_id,
                from_status: IncidentStatus::from_str(&from)
                    .ok_or_else(|| decode_err("from_status", &from))?,
                to_status: IncidentStatus::from_str(&to)
                    .ok_or_else(|| decode_err("to_status", &to))?,
                reason,
                at,
            });
        }
        Ok(out)
    }
}
