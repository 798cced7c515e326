use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use ulid::Ulid;

use crate::error::AppError;

pub fn now_rfc3339_utc() -> Result<String, AppError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| AppError::new("CLOCK_FORMAT_FAILED", "Failed to format time").with_details(e.to_string()))
}

/// `INC-<ULID>`: globally unique and lexicographically ordered by creation time.
pub fn new_incident_id() -> String {
    format!("INC-{}", Ulid::new())
}

pub fn new_execution_ref() -> String {
    format!("exec-{}", Ulid::new())
}
