use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::domain::document::{
    ApprovalType, Document, DocumentId, DocumentStatus, DocumentType, LineItem,
};
use crate::errors::WorkflowError;
use crate::gst::GstBreakdown;
use crate::hierarchy::{ApprovalRouting, Assignee, HierarchySnapshot};
use crate::workflow::actor::{authorize, Actor, AnonymousActionPolicy};
use crate::workflow::policy::{decide, Transition, WorkflowAction};

/// Storage-layer failures, kept free of domain vocabulary so backends stay
/// interchangeable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document `{0}` was not found")]
    NotFound(String),
    #[error("document `{0}` failed its transition guard")]
    Conflict(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::Conflict(id) => WorkflowError::Conflict { document_id: id },
            StoreError::Backend(message) => WorkflowError::Persistence(message),
        }
    }
}

/// Optimistic guard captured from the document a transition was decided
/// against. The store must refuse the write when the persisted row no longer
/// matches, which serializes concurrent actions on one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionGuard {
    pub status: DocumentStatus,
    pub current_approval_level: u32,
    pub revision: u32,
}

impl TransitionGuard {
    pub fn of(document: &Document) -> Self {
        Self {
            status: document.status,
            current_approval_level: document.current_approval_level,
            revision: document.revision,
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.status == document.status
            && self.current_approval_level == document.current_approval_level
            && self.revision == document.revision
    }
}

/// Persistence seam for the engine.
///
/// Every mutating method takes the audit entry describing it; implementations
/// must write both in one transaction so the log never disagrees with the
/// document.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document, StoreError>;

    async fn insert_document(
        &self,
        document: &Document,
        line_items: &[LineItem],
        entry: &AuditEntry,
    ) -> Result<(), StoreError>;

    /// `status_notes` is the already-resolved value to write on the
    /// document, not raw caller input; `None` clears the column.
    async fn apply_transition(
        &self,
        id: &DocumentId,
        guard: &TransitionGuard,
        transition: &Transition,
        status_notes: Option<&str>,
        entry: &AuditEntry,
    ) -> Result<Document, StoreError>;

    async fn update_amounts(
        &self,
        id: &DocumentId,
        guard: &TransitionGuard,
        amounts: &GstBreakdown,
        entry: &AuditEntry,
    ) -> Result<Document, StoreError>;
}

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Payload for an approval-request email to the approver a document is now
/// waiting on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalRequestNotice {
    pub document_id: DocumentId,
    pub external_ref: String,
    pub document_type: DocumentType,
    pub total_amount: Decimal,
    pub level: u32,
    pub approver: Assignee,
    pub document_url: Option<String>,
    /// Attachment urls included in the request email so the approver can
    /// open the source paperwork directly.
    pub attachments: Vec<String>,
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn approval_requested(
        &self,
        notice: &ApprovalRequestNotice,
    ) -> Result<(), NotificationError>;
}

/// Everything a caller supplies to create a document.
#[derive(Clone, Debug)]
pub struct DocumentIntake {
    pub document_type: DocumentType,
    pub invoice_number: Option<String>,
    pub po_number: Option<String>,
    pub vendor_info: Option<String>,
    pub total_amount: Decimal,
    pub gst_rate: Decimal,
    pub approval_type: ApprovalType,
    pub line_items: Vec<LineItem>,
    pub document_url: Option<String>,
    pub attachments: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub submitted_by: Option<String>,
}

/// Result of a committed engine operation.
///
/// `notified` reports whether the follow-up approval request was delivered;
/// delivery failure never rolls back the committed transition.
#[derive(Clone, Debug)]
pub struct ActionOutcome {
    pub document: Document,
    pub audit_action: String,
    pub notified: bool,
}

/// Drives the approval lifecycle: intake, approve/reject/hold transitions,
/// and amount corrections. Persists through [`WorkflowStore`] and sends
/// approval requests through [`NotificationGateway`] strictly after the
/// store commit.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    gateway: Arc<dyn NotificationGateway>,
    anonymous_policy: AnonymousActionPolicy,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { store, gateway, anonymous_policy: AnonymousActionPolicy::default() }
    }

    pub fn with_anonymous_policy(mut self, policy: AnonymousActionPolicy) -> Self {
        self.anonymous_policy = policy;
        self
    }

    /// Create a document, route it to its initial approver, and request the
    /// first approval.
    pub async fn create_document(
        &self,
        intake: DocumentIntake,
        routing: &ApprovalRouting,
    ) -> Result<ActionOutcome, WorkflowError> {
        if intake.total_amount <= Decimal::ZERO {
            return Err(WorkflowError::Validation(format!(
                "total amount must be positive, got {}",
                intake.total_amount
            )));
        }
        if intake.gst_rate < Decimal::ZERO {
            return Err(WorkflowError::Validation(format!(
                "gst rate must not be negative, got {}",
                intake.gst_rate
            )));
        }

        let assignee = initial_assignee(&intake, routing)?;
        let amounts = GstBreakdown::inclusive(intake.total_amount, intake.gst_rate);
        let now = chrono::Utc::now();

        let document = Document {
            id: DocumentId(Uuid::new_v4().to_string()),
            document_type: intake.document_type,
            invoice_number: intake.invoice_number,
            po_number: intake.po_number,
            vendor_info: intake.vendor_info,
            total_amount: amounts.total_amount,
            subtotal: amounts.subtotal,
            gst_amount: amounts.gst_amount,
            gst_rate: amounts.rate,
            status: DocumentStatus::Pending,
            status_notes: None,
            approval_type: intake.approval_type,
            current_approval_level: 1,
            approver_email: assignee.email.clone(),
            document_url: intake.document_url,
            attachments: intake.attachments,
            custom_fields: intake.custom_fields,
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        let actor = intake.submitted_by.unwrap_or_else(|| "system".to_string());
        let entry =
            AuditEntry::new(document.id.clone(), document.external_ref(), "created", actor, None);
        self.store.insert_document(&document, &intake.line_items, &entry).await?;

        let notified = self.request_approval(&document, &assignee, 1).await;
        Ok(ActionOutcome { document, audit_action: "created".to_string(), notified })
    }

    /// Apply one approve/reject/hold action on behalf of `actor`.
    pub async fn apply_action(
        &self,
        id: &DocumentId,
        action: WorkflowAction,
        actor: &Actor,
        notes: Option<String>,
        hierarchy: &HierarchySnapshot,
    ) -> Result<ActionOutcome, WorkflowError> {
        let document = self.store.fetch_document(id).await?;
        let recorded_actor =
            authorize(actor, action, &document, hierarchy, &self.anonymous_policy)?;
        let transition = decide(&document, action, hierarchy)?;

        let guard = TransitionGuard::of(&document);
        let status_notes = transition.status_notes(notes.as_deref());
        let entry = AuditEntry::new(
            document.id.clone(),
            document.external_ref(),
            transition.audit_action.clone(),
            recorded_actor,
            notes,
        );
        let updated = self
            .store
            .apply_transition(id, &guard, &transition, status_notes.as_deref(), &entry)
            .await?;

        let notified = match &transition.next_approver {
            Some(assignee) => self.request_approval(&updated, assignee, transition.level).await,
            None => false,
        };

        tracing::info!(
            event_name = "workflow_transition",
            document_id = %updated.id.0,
            action = %transition.audit_action,
            status = %updated.status.as_str(),
            level = updated.current_approval_level,
            "workflow action applied"
        );

        Ok(ActionOutcome { document: updated, audit_action: transition.audit_action, notified })
    }

    /// Correct a document's total and recompute the GST split at its stored
    /// rate.
    ///
    /// Any amount correction forces the document back to `pending` for
    /// re-review. The approval level is kept and the current approver is not
    /// re-notified of the change.
    pub async fn update_total(
        &self,
        id: &DocumentId,
        new_total: Decimal,
        actor: impl Into<String>,
    ) -> Result<Document, WorkflowError> {
        if new_total <= Decimal::ZERO {
            return Err(WorkflowError::Validation(format!(
                "total amount must be positive, got {new_total}"
            )));
        }

        let document = self.store.fetch_document(id).await?;
        let amounts = GstBreakdown::inclusive(new_total, document.gst_rate);
        let guard = TransitionGuard::of(&document);
        let entry = AuditEntry::new(
            document.id.clone(),
            document.external_ref(),
            "amount_updated",
            actor,
            Some(format!("total {} -> {}", document.total_amount, new_total)),
        );

        let updated = self.store.update_amounts(id, &guard, &amounts, &entry).await?;
        Ok(updated)
    }

    async fn request_approval(&self, document: &Document, assignee: &Assignee, level: u32) -> bool {
        let notice = ApprovalRequestNotice {
            document_id: document.id.clone(),
            external_ref: document.external_ref().to_string(),
            document_type: document.document_type,
            total_amount: document.total_amount,
            level,
            approver: assignee.clone(),
            document_url: document.document_url.clone(),
            attachments: document.attachments.clone(),
        };

        match self.gateway.approval_requested(&notice).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    event_name = "notification_failed",
                    document_id = %document.id.0,
                    approver = %assignee.email,
                    error = %error,
                    "approval request delivery failed; workflow state already committed"
                );
                false
            }
        }
    }
}

fn initial_assignee(
    intake: &DocumentIntake,
    routing: &ApprovalRouting,
) -> Result<Assignee, WorkflowError> {
    match intake.approval_type {
        ApprovalType::Hierarchy => routing.hierarchy.resolve(1).ok_or_else(|| {
            WorkflowError::Configuration("no active level 1 approver configured".to_string())
        }),
        ApprovalType::Department => {
            let department = intake.document_type.department();
            routing
                .first_department_approver(department)
                .map(|approver| Assignee {
                    name: approver.name.clone(),
                    email: approver.email.clone(),
                })
                .ok_or_else(|| {
                    WorkflowError::Configuration(format!(
                        "no active approver configured for the {} department",
                        department.as_str()
                    ))
                })
        }
        ApprovalType::Single => routing
            .active_single_approver()
            .map(|approver| Assignee { name: approver.name.clone(), email: approver.email.clone() })
            .ok_or_else(|| {
                WorkflowError::Configuration("no active single approver configured".to_string())
            }),
    }
}
