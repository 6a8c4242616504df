//! In-memory store and gateway doubles for exercising the engine without a
//! database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::audit::AuditEntry;
use crate::domain::document::{Document, DocumentId, DocumentStatus, LineItem};
use crate::gst::GstBreakdown;
use crate::workflow::engine::{
    ApprovalRequestNotice, NotificationError, NotificationGateway, StoreError, TransitionGuard,
    WorkflowStore,
};
use crate::workflow::policy::Transition;

#[derive(Default)]
struct StoreState {
    documents: HashMap<String, Document>,
    line_items: HashMap<String, Vec<LineItem>>,
    audit: Vec<AuditEntry>,
}

/// [`WorkflowStore`] backed by a mutex-guarded map. Honors the transition
/// guard the same way the SQL store does, so concurrency behavior is
/// testable without a database.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: Mutex<StoreState>,
}

impl InMemoryWorkflowStore {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state().audit.clone()
    }

    pub fn line_items(&self, id: &DocumentId) -> Vec<LineItem> {
        self.state().line_items.get(&id.0).cloned().unwrap_or_default()
    }

    pub fn document(&self, id: &DocumentId) -> Option<Document> {
        self.state().documents.get(&id.0).cloned()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document, StoreError> {
        self.state()
            .documents
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.0.clone()))
    }

    async fn insert_document(
        &self,
        document: &Document,
        line_items: &[LineItem],
        entry: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.documents.contains_key(&document.id.0) {
            return Err(StoreError::Backend(format!(
                "document `{}` already exists",
                document.id.0
            )));
        }
        state.documents.insert(document.id.0.clone(), document.clone());
        state.line_items.insert(document.id.0.clone(), line_items.to_vec());
        state.audit.push(entry.clone());
        Ok(())
    }

    async fn apply_transition(
        &self,
        id: &DocumentId,
        guard: &TransitionGuard,
        transition: &Transition,
        status_notes: Option<&str>,
        entry: &AuditEntry,
    ) -> Result<Document, StoreError> {
        let mut state = self.state();
        let document =
            state.documents.get_mut(&id.0).ok_or_else(|| StoreError::NotFound(id.0.clone()))?;
        if !guard.matches(document) {
            return Err(StoreError::Conflict(id.0.clone()));
        }

        document.status = transition.status;
        document.current_approval_level = transition.level;
        if let Some(assignee) = &transition.next_approver {
            document.approver_email = assignee.email.clone();
        }
        document.status_notes = status_notes.map(str::to_string);
        document.revision += 1;
        document.updated_at = Utc::now();

        let updated = document.clone();
        state.audit.push(entry.clone());
        Ok(updated)
    }

    async fn update_amounts(
        &self,
        id: &DocumentId,
        guard: &TransitionGuard,
        amounts: &GstBreakdown,
        entry: &AuditEntry,
    ) -> Result<Document, StoreError> {
        let mut state = self.state();
        let document =
            state.documents.get_mut(&id.0).ok_or_else(|| StoreError::NotFound(id.0.clone()))?;
        if !guard.matches(document) {
            return Err(StoreError::Conflict(id.0.clone()));
        }

        document.total_amount = amounts.total_amount;
        document.subtotal = amounts.subtotal;
        document.gst_amount = amounts.gst_amount;
        document.gst_rate = amounts.rate;
        document.status = DocumentStatus::Pending;
        document.revision += 1;
        document.updated_at = Utc::now();

        let updated = document.clone();
        state.audit.push(entry.clone());
        Ok(updated)
    }
}

/// Accepts every notice without delivering anything.
pub struct NoopGateway;

#[async_trait]
impl NotificationGateway for NoopGateway {
    async fn approval_requested(
        &self,
        _notice: &ApprovalRequestNotice,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// Captures every notice for later assertions.
#[derive(Default)]
pub struct RecordingGateway {
    notices: Mutex<Vec<ApprovalRequestNotice>>,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<ApprovalRequestNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn approval_requested(
        &self,
        notice: &ApprovalRequestNotice,
    ) -> Result<(), NotificationError> {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
        Ok(())
    }
}

/// Fails every delivery, for exercising the commit-then-notify contract.
pub struct FailingGateway;

#[async_trait]
impl NotificationGateway for FailingGateway {
    async fn approval_requested(
        &self,
        notice: &ApprovalRequestNotice,
    ) -> Result<(), NotificationError> {
        Err(NotificationError(format!("mail relay unavailable for {}", notice.approver.email)))
    }
}
