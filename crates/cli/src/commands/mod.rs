pub mod act;
pub mod audit;
pub mod config;
pub mod doctor;
pub mod intake;
pub mod migrate;
pub mod seed;

use std::sync::Arc;

use serde::Serialize;

use apflow_core::config::{AppConfig, LoadOptions};
use apflow_core::{NotificationGateway, WorkflowError};
use apflow_notify::{EmailNotificationGateway, HttpMailTransport, NoopMailTransport};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loaded config plus a current-thread runtime; every database-touching
/// command starts from one of these.
pub(crate) struct CliContext {
    pub config: AppConfig,
    pub runtime: tokio::runtime::Runtime,
}

pub(crate) fn init(command: &str) -> Result<CliContext, CommandResult> {
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok(CliContext { config, runtime })
}

/// Outbound mail for the engine. Disabled mail still gets a gateway so the
/// commit-then-notify path is exercised identically; it just delivers nowhere.
pub(crate) fn build_gateway(config: &AppConfig) -> Result<Arc<dyn NotificationGateway>, String> {
    let transport: Arc<dyn apflow_notify::MailTransport> = if config.mail.enabled {
        Arc::new(
            HttpMailTransport::new(
                config.mail.base_url.clone(),
                config.mail.api_token.clone(),
                config.mail.timeout_secs,
            )
            .map_err(|error| format!("failed to build mail transport: {error}"))?,
        )
    } else {
        Arc::new(NoopMailTransport)
    };

    Ok(Arc::new(EmailNotificationGateway::new(
        transport,
        config.mail.from_address.clone(),
        config.server.public_base_url.clone(),
    )))
}

pub(crate) fn workflow_error_class(error: &WorkflowError) -> &'static str {
    match error {
        WorkflowError::NotFound(_) => "not_found",
        WorkflowError::Forbidden { .. } | WorkflowError::AnonymousNotPermitted { .. } => {
            "forbidden"
        }
        WorkflowError::InvalidTransition { .. } => "invalid_transition",
        WorkflowError::Configuration(_) => "configuration",
        WorkflowError::Conflict { .. } => "conflict",
        WorkflowError::Validation(_) => "validation",
        WorkflowError::Persistence(_) => "persistence",
    }
}

#[cfg(test)]
mod tests {
    use apflow_core::{DocumentStatus, WorkflowError};

    use super::{workflow_error_class, CommandResult};

    #[test]
    fn success_payload_is_machine_readable() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        assert_eq!(result.exit_code, 0);

        let parsed: serde_json::Value =
            serde_json::from_str(&result.output).expect("valid json payload");
        assert_eq!(parsed["command"], "migrate");
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["error_class"].is_null());
    }

    #[test]
    fn failure_payload_carries_the_error_class_and_exit_code() {
        let result = CommandResult::failure("seed", "db_connectivity", "no such host", 4);
        assert_eq!(result.exit_code, 4);

        let parsed: serde_json::Value =
            serde_json::from_str(&result.output).expect("valid json payload");
        assert_eq!(parsed["status"], "error");
        assert_eq!(parsed["error_class"], "db_connectivity");
    }

    #[test]
    fn workflow_errors_map_to_stable_classes() {
        assert_eq!(workflow_error_class(&WorkflowError::NotFound("x".into())), "not_found");
        assert_eq!(
            workflow_error_class(&WorkflowError::Conflict { document_id: "x".into() }),
            "conflict"
        );
        assert_eq!(
            workflow_error_class(&WorkflowError::InvalidTransition {
                status: DocumentStatus::Approved
            }),
            "invalid_transition"
        );
    }
}
