use async_trait::async_trait;
use thiserror::Error;

use apflow_core::audit::{AuditEntry, AuditQuery};
use apflow_core::domain::approver::{ApprovalDepartment, Approver, ApproverId};
use apflow_core::domain::document::{Document, DocumentId, DocumentStatus, DocumentType, LineItem};
use apflow_core::hierarchy::{ApprovalRouting, HierarchyLevel, HierarchySnapshot};

pub mod audit;
pub mod document;
pub mod hierarchy;

pub use audit::SqlAuditLogRepository;
pub use document::{DocumentListPage, DocumentListQuery, SqlDocumentRepository};
pub use hierarchy::{HierarchySettingsUpdate, SqlHierarchyRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Read side of document storage. Mutations go through the core
/// `WorkflowStore` implementation on [`SqlDocumentRepository`] so every write
/// carries its audit entry.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;

    async fn line_items(&self, id: &DocumentId) -> Result<Vec<LineItem>, RepositoryError>;

    async fn list(&self, query: &DocumentListQuery) -> Result<DocumentListPage, RepositoryError>;

    async fn count_by_status(&self, status: DocumentStatus)
        -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError>;

    async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Approval configuration: the level chain, the settings singleton, and the
/// approver directory.
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    async fn load_snapshot(&self) -> Result<HierarchySnapshot, RepositoryError>;

    async fn load_routing(&self) -> Result<ApprovalRouting, RepositoryError>;

    /// Replace the configured level chain wholesale and bump the settings
    /// version.
    async fn replace_levels(&self, levels: &[HierarchyLevel]) -> Result<(), RepositoryError>;

    async fn update_settings(
        &self,
        update: &HierarchySettingsUpdate,
    ) -> Result<HierarchySnapshot, RepositoryError>;

    async fn upsert_approver(&self, approver: &Approver) -> Result<(), RepositoryError>;

    async fn list_approvers(&self) -> Result<Vec<Approver>, RepositoryError>;

    async fn set_department_order(
        &self,
        department: ApprovalDepartment,
        order: &[ApproverId],
    ) -> Result<(), RepositoryError>;
}

pub(crate) fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn unknown_variant(column: &str, value: &str) -> RepositoryError {
    RepositoryError::Decode(format!("unknown {column} value `{value}`"))
}

pub(crate) fn parse_document_type(value: &str) -> Result<DocumentType, RepositoryError> {
    DocumentType::parse(value).ok_or_else(|| unknown_variant("document_type", value))
}
