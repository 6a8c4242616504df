use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::message::OutboundEmail;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("mail relay request failed: {0}")]
    Request(String),
    #[error("mail relay rejected the message: HTTP {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), TransportError>;
}

/// Posts messages to an HTTP mail relay (`POST {base_url}/api/send`).
pub struct HttpMailTransport {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl HttpMailTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))?;
        Ok(Self { client, base_url: base_url.into(), api_token })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let url = format!("{}/api/send", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(email);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Rejected { status: response.status().as_u16() });
        }
        Ok(())
    }
}

/// Accepts everything and delivers nothing. Used when mail is disabled.
#[derive(Default)]
pub struct NoopMailTransport;

#[async_trait]
impl MailTransport for NoopMailTransport {
    async fn deliver(&self, _email: &OutboundEmail) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Captures delivered messages for assertions; can be scripted to fail.
#[derive(Default)]
pub struct RecordingMailTransport {
    delivered: Mutex<Vec<OutboundEmail>>,
    failures: Mutex<Vec<TransportError>>,
}

impl RecordingMailTransport {
    pub fn failing_with(errors: Vec<TransportError>) -> Self {
        Self { delivered: Mutex::new(Vec::new()), failures: Mutex::new(errors) }
    }

    pub fn delivered(&self) -> Vec<OutboundEmail> {
        match self.delivered.lock() {
            Ok(delivered) => delivered.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl MailTransport for RecordingMailTransport {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let next_failure = match self.failures.lock() {
            Ok(mut failures) => failures.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        };
        if let Some(error) = next_failure {
            return Err(error);
        }

        match self.delivered.lock() {
            Ok(mut delivered) => delivered.push(email.clone()),
            Err(poisoned) => poisoned.into_inner().push(email.clone()),
        }
        Ok(())
    }
}
