use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::document::DocumentId;

/// Immutable record of one workflow transition. Appended in the same
/// transaction as the document mutation it describes; never updated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub document_id: DocumentId,
    pub external_ref: String,
    pub action: String,
    pub actor: String,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        document_id: DocumentId,
        external_ref: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            document_id,
            external_ref: external_ref.into(),
            action: action.into(),
            actor: actor.into(),
            notes,
            occurred_at: Utc::now(),
        }
    }
}

/// Filter set for querying the audit log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub document_id: Option<DocumentId>,
    pub action: Option<String>,
    pub actor: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}
