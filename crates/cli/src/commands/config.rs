use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use apflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let api_token = if config.mail.api_token.is_some() { "<redacted>" } else { "<unset>" };
    let fields: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "APFLOW_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "APFLOW_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "APFLOW_DATABASE_TIMEOUT_SECS",
        ),
        ("mail.enabled", config.mail.enabled.to_string(), "APFLOW_MAIL_ENABLED"),
        ("mail.base_url", config.mail.base_url.clone(), "APFLOW_MAIL_BASE_URL"),
        ("mail.from_address", config.mail.from_address.clone(), "APFLOW_MAIL_FROM_ADDRESS"),
        ("mail.api_token", api_token.to_string(), "APFLOW_MAIL_API_TOKEN"),
        ("mail.timeout_secs", config.mail.timeout_secs.to_string(), "APFLOW_MAIL_TIMEOUT_SECS"),
        ("server.bind_address", config.server.bind_address.clone(), "APFLOW_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "APFLOW_SERVER_PORT"),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "APFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        (
            "server.public_base_url",
            config.server.public_base_url.clone(),
            "APFLOW_SERVER_PUBLIC_BASE_URL",
        ),
        (
            "intake.default_gst_rate",
            config.intake.default_gst_rate.to_string(),
            "APFLOW_INTAKE_DEFAULT_GST_RATE",
        ),
        (
            "intake.allow_email_actions",
            config.intake.allow_email_actions.to_string(),
            "APFLOW_INTAKE_ALLOW_EMAIL_ACTIONS",
        ),
        ("logging.level", config.logging.level.clone(), "APFLOW_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "APFLOW_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        let source = field_source(
            key,
            env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("apflow.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/apflow.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
