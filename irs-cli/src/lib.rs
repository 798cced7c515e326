pub mod adapters;
pub mod cli;
pub mod orchestrator;

pub use orchestrator::{AlarmDisposition, Capabilities, IncidentResult, IncidentView, IngestOutcome, Orchestrator};
