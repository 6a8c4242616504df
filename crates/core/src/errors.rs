use thiserror::Error;

use crate::domain::document::DocumentStatus;

/// Failure taxonomy for workflow operations.
///
/// Persistence and validation failures abort the enclosing transaction;
/// notification delivery failures never surface here (they are logged and
/// swallowed by the engine).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("document `{0}` was not found")]
    NotFound(String),
    #[error("actor `{actor}` is not the pending approver (`{expected}`)")]
    Forbidden { actor: String, expected: String },
    #[error("anonymous actors are not permitted to `{action}`")]
    AnonymousNotPermitted { action: String },
    #[error("no workflow action is valid from terminal status {status:?}")]
    InvalidTransition { status: DocumentStatus },
    #[error("approver configuration incomplete: {0}")]
    Configuration(String),
    #[error("document `{document_id}` changed concurrently; re-read and retry")]
    Conflict { document_id: String },
    #[error("invalid intake: {0}")]
    Validation(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}
