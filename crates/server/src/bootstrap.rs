use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use apflow_core::config::{AppConfig, ConfigError, LoadOptions};
use apflow_core::{AnonymousActionPolicy, WorkflowEngine};
use apflow_db::{connect_with_settings, migrations, DbPool};
use apflow_notify::{EmailNotificationGateway, MailTransport, NoopMailTransport};

use crate::routes::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api_state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("mail transport initialization failed: {0}")]
    MailTransport(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap_start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "bootstrap_database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "bootstrap_migrations_applied", "database migrations applied");

    let transport: Arc<dyn MailTransport> = if config.mail.enabled {
        Arc::new(
            apflow_notify::HttpMailTransport::new(
                config.mail.base_url.clone(),
                config.mail.api_token.clone(),
                config.mail.timeout_secs,
            )
            .map_err(|error| BootstrapError::MailTransport(error.to_string()))?,
        )
    } else {
        Arc::new(NoopMailTransport)
    };
    let gateway = Arc::new(EmailNotificationGateway::new(
        transport,
        config.mail.from_address.clone(),
        config.server.public_base_url.clone(),
    ));

    let anonymous_policy = if config.intake.allow_email_actions {
        AnonymousActionPolicy::default()
    } else {
        AnonymousActionPolicy::deny_all()
    };
    let engine = Arc::new(
        WorkflowEngine::new(
            Arc::new(apflow_db::repositories::SqlDocumentRepository::new(db_pool.clone())),
            gateway,
        )
        .with_anonymous_policy(anonymous_policy),
    );

    let api_state = ApiState::new(db_pool.clone(), engine, config.intake.default_gst_rate);

    Ok(Application { config, db_pool, api_state })
}

#[cfg(test)]
mod tests {
    use apflow_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn memory_options() -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_applies_the_schema() {
        let app = bootstrap(memory_options()).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('document', 'line_item', 'audit_log', 'hierarchy_level')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query should succeed");
        assert_eq!(table_count, 4, "baseline workflow tables should exist after bootstrap");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_mail_config() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                mail_enabled: Some(true),
                mail_base_url: Some("not-a-url".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("invalid mail config should fail").to_string();
        assert!(message.contains("mail.base_url"));
    }
}
