pub mod settings;

pub use settings::{AiConfig, IntakeConfig, IrsSettings, NotifyConfig, RemediationConfig, StoreConfig};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::AppError;

const DEFAULT_FILTER: &str = "irs=info,irs_lib=info,irs_core=info,irs_ai=info";

/// Install the global subscriber. `level` (e.g. from `--log-level`) wins over `RUST_LOG`.
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_logging(level: Option<&str>) -> Result<(), AppError> {
    let env_filter = match level {
        Some(l) => EnvFilter::try_new(format!("irs={l},irs_lib={l},irs_core={l},irs_ai={l}")).map_err(|e| {
            AppError::new("CONFIG_INVALID", "Invalid log level").with_details(e.to_string())
        })?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .compact(),
        )
        .try_init()
        .map_err(|e| {
            AppError::new("LOGGING_INIT_FAILED", "Failed to install log subscriber").with_details(e.to_string())
        })?;

    tracing::debug!("structured logging initialized");
    Ok(())
}
