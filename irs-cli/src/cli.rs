//! Command-line front door. Every command prints one JSON envelope on stdout carrying an
//! explicit `status`; logs go to stderr.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use irs_ai::embeddings::{Embedder, OllamaEmbedder};
use irs_ai::llm::{Llm, OllamaLlm};
use irs_ai::ollama::OllamaClient;
use irs_core::config::IrsSettings;
use irs_core::domain::IncidentStatus;
use irs_core::error::AppError;
use irs_core::ingress::{ExecutionOutcome, ManualActionRequest, OperatorAction, ResolutionCallback};
use irs_core::notify::{LogNotifier, Notifier};
use irs_core::remediation::DefaultStrategy;
use irs_core::store::{IncidentStore, SqliteIncidentStore};
use serde::Serialize;
use serde_json::Value;

use crate::adapters::{HookCompute, SshExec, WebhookNotifier};
use crate::orchestrator::{Capabilities, Orchestrator};

#[derive(Parser)]
#[command(name = "irs")]
#[command(about = "Incident response orchestrator: alarm intake, auto-remediation and escalation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Configuration file path (TOML)
    #[arg(long, global = true, env = "IRS_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and apply migrations
    InitDb,

    /// Ingest an alarm, resolution callback or operator action payload (`-` for stdin)
    Ingest { input: String },

    /// Operator decision on an open or escalated incident
    Action {
        #[arg(long)]
        id: String,
        /// "manual" resolves the incident; "auto" starts remediation
        #[arg(long)]
        action: String,
    },

    /// Run the remediation plan on an open incident, recorded as operator-driven
    Escalate { id: String },

    /// Report the outcome of an externally run execution
    Callback {
        #[arg(long)]
        id: String,
        #[arg(long)]
        outcome: String,
        #[arg(long, default_value = "")]
        report: String,
    },

    Show { id: String },

    List {
        #[arg(long)]
        status: Option<String>,
    },

    /// Archive a resolved incident
    Close { id: String },

    /// Re-send the notification for the incident's current state
    Notify { id: String },

    /// Print the similarity-feed document for a resolved or closed incident
    Feed { id: String },

    /// Check the store and configured collaborators
    Health,
}

#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<AppError>,
}

#[derive(Debug, Serialize)]
struct InitDbResponse {
    db_path: String,
}

#[derive(Debug, Serialize)]
struct ComponentHealth {
    ok: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    store: ComponentHealth,
    ai: ComponentHealth,
    notify: ComponentHealth,
    compute: ComponentHealth,
}

fn emit<T: Serialize>(result: Result<T, AppError>) -> Result<()> {
    let (envelope, failure) = match result {
        Ok(data) => (
            Envelope {
                status: "ok",
                data: Some(data),
                error: None,
            },
            None,
        ),
        Err(e) => (
            Envelope {
                status: "error",
                data: None,
                error: Some(e.clone()),
            },
            Some(e),
        ),
    };
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    match failure {
        Some(e) => Err(anyhow::Error::new(e)),
        None => Ok(()),
    }
}

fn read_payload(input: &str) -> Result<Value, AppError> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(|e| {
            AppError::new("INGRESS_READ_FAILED", "Failed to read payload from stdin").with_details(e.to_string())
        })?;
        buf
    } else {
        std::fs::read_to_string(input).map_err(|e| {
            AppError::new("INGRESS_READ_FAILED", "Failed to read payload file")
                .with_details(format!("path={input}; err={e}"))
        })?
    };
    serde_json::from_str(&text).map_err(|e| {
        AppError::new("INGRESS_INVALID_JSON", "Payload is not valid JSON").with_details(e.to_string())
    })
}

fn parse_status(s: &str) -> Result<IncidentStatus, AppError> {
    IncidentStatus::from_str(s).ok_or_else(|| {
        AppError::new("INGRESS_INVALID_STATUS", "Unknown incident status").with_details(format!("status={s}"))
    })
}

fn ollama_client(settings: &IrsSettings) -> Result<Option<OllamaClient>, AppError> {
    settings
        .ai
        .ollama_endpoint
        .as_deref()
        .map(|url| OllamaClient::new(url, Duration::from_secs(settings.ai.timeout_secs)))
        .transpose()
}

/// Build every collaborator from settings and hand the composed orchestrator to `f`.
fn with_orchestrator<T>(
    settings: &IrsSettings,
    f: impl FnOnce(&Orchestrator) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let store = SqliteIncidentStore::open(&settings.store.db_path)?;
    let strategy = DefaultStrategy;
    let compute = HookCompute::new(
        settings.remediation.compute_hook.clone(),
        settings.remediation.connect_timeout(),
    );
    let exec = SshExec::new(
        &compute,
        settings.remediation.ssh_user.clone(),
        settings.remediation.ssh_identity_file.clone(),
    );
    let notifier: Box<dyn Notifier> = match &settings.notify.webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(settings.notify.timeout_secs),
        )),
        None => Box::new(LogNotifier),
    };
    let client = ollama_client(settings)?;
    let llm = client.clone().map(OllamaLlm::new);
    let embedder = client.map(OllamaEmbedder::new);

    let caps = Capabilities {
        store: &store,
        strategy: &strategy,
        compute: &compute,
        exec: &exec,
        notifier: notifier.as_ref(),
        llm: llm.as_ref().map(|l| l as &dyn Llm),
        embedder: embedder.as_ref().map(|e| e as &dyn Embedder),
    };
    let orchestrator = Orchestrator::new(caps, settings.clone());
    f(&orchestrator)
}

fn health(settings: &IrsSettings) -> HealthReport {
    let store = match SqliteIncidentStore::open(&settings.store.db_path).and_then(|s| s.list(None)) {
        Ok(all) => ComponentHealth {
            ok: true,
            message: format!("{} incidents in {}", all.len(), settings.store.db_path.display()),
        },
        Err(e) => ComponentHealth {
            ok: false,
            message: e.to_string(),
        },
    };

    let ai = match ollama_client(settings) {
        Ok(None) => ComponentHealth {
            ok: true,
            message: "no model endpoint configured; canned reports in use".to_string(),
        },
        Ok(Some(client)) => match client.health_check() {
            Ok(()) => ComponentHealth {
                ok: true,
                message: format!("Ollama reachable at {}", client.base_url()),
            },
            Err(e) => ComponentHealth {
                ok: false,
                message: e.to_string(),
            },
        },
        Err(e) => ComponentHealth {
            ok: false,
            message: e.to_string(),
        },
    };

    let notify = ComponentHealth {
        ok: true,
        message: match &settings.notify.webhook_url {
            Some(url) => format!("webhook {url}"),
            None => "no webhook configured; notifications are logged only".to_string(),
        },
    };

    let compute = match &settings.remediation.compute_hook {
        Some(hook) if hook.is_file() => ComponentHealth {
            ok: true,
            message: format!("compute hook {}", hook.display()),
        },
        Some(hook) => ComponentHealth {
            ok: false,
            message: format!("compute hook {} not found", hook.display()),
        },
        None => ComponentHealth {
            ok: false,
            message: "no compute hook configured; resize and restart will fail to manual".to_string(),
        },
    };

    HealthReport {
        store,
        ai,
        notify,
        compute,
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn run(self) -> Result<()> {
        let settings = IrsSettings::load(self.config.as_deref()).context("failed to load configuration")?;
        tracing::debug!(db_path = %settings.store.db_path.display(), "configuration loaded");

        match self.command {
            Commands::InitDb => emit(SqliteIncidentStore::open(&settings.store.db_path).map(|_| InitDbResponse {
                db_path: settings.store.db_path.display().to_string(),
            })),
            Commands::Ingest { input } => emit(
                read_payload(&input).and_then(|payload| with_orchestrator(&settings, |o| o.ingest(&payload))),
            ),
            Commands::Action { id, action } => emit(OperatorAction::parse(&action).and_then(|action| {
                with_orchestrator(&settings, |o| {
                    o.handle_operator_action(&ManualActionRequest {
                        incident_id: id,
                        action,
                    })
                })
            })),
            Commands::Escalate { id } => emit(with_orchestrator(&settings, |o| o.manual_escalate(&id))),
            Commands::Callback { id, outcome, report } => emit(with_orchestrator(&settings, |o| {
                o.handle_callback(&ResolutionCallback {
                    incident_id: id,
                    outcome: ExecutionOutcome::parse(&outcome),
                    report,
                })
            })),
            Commands::Show { id } => emit(with_orchestrator(&settings, |o| o.show(&id))),
            Commands::List { status } => emit(
                status
                    .as_deref()
                    .map(parse_status)
                    .transpose()
                    .and_then(|status| with_orchestrator(&settings, |o| o.list(status))),
            ),
            Commands::Close { id } => emit(with_orchestrator(&settings, |o| o.close(&id))),
            Commands::Notify { id } => emit(with_orchestrator(&settings, |o| o.retry_notification(&id))),
            Commands::Feed { id } => emit(with_orchestrator(&settings, |o| o.feed(&id))),
            Commands::Health => emit(Ok::<_, AppError>(health(&settings))),
        }
    }
}
