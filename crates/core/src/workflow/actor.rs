use serde::{Deserialize, Serialize};

use crate::domain::document::{ApprovalType, Document};
use crate::errors::WorkflowError;
use crate::hierarchy::HierarchySnapshot;
use crate::workflow::policy::WorkflowAction;

/// Audit-log identity recorded for emailed-action-link transitions.
pub const EMAIL_ACTOR: &str = "email-approver";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverIdentity {
    pub name: String,
    pub email: String,
    pub active: bool,
}

/// Who is asking for a transition.
///
/// `Anonymous` is the emailed-action-link path. It carries no identity and
/// bypasses the approver check entirely, so whether it is allowed at all is
/// an explicit policy decision per action rather than an implicit skip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Authenticated(ApproverIdentity),
    Anonymous,
}

/// Which actions the unauthenticated email-link path may perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnonymousActionPolicy {
    allowed: Vec<WorkflowAction>,
}

impl Default for AnonymousActionPolicy {
    /// Matches the historical behavior: emailed links can approve, reject,
    /// and hold without any authorization check.
    fn default() -> Self {
        Self { allowed: vec![WorkflowAction::Approve, WorkflowAction::Reject, WorkflowAction::Hold] }
    }
}

impl AnonymousActionPolicy {
    pub fn deny_all() -> Self {
        Self { allowed: Vec::new() }
    }

    pub fn allowing(allowed: Vec<WorkflowAction>) -> Self {
        Self { allowed }
    }

    pub fn permits(&self, action: WorkflowAction) -> bool {
        self.allowed.contains(&action)
    }
}

/// Authorize `actor` to perform `action` on `document`.
///
/// Returns the identity string to record in the audit log. Authenticated
/// actors must match the pending approver: in hierarchy mode the seat bound
/// to the document's current level in the snapshot, otherwise the
/// denormalized `approver_email`. Inactive identities are always refused.
pub fn authorize(
    actor: &Actor,
    action: WorkflowAction,
    document: &Document,
    hierarchy: &HierarchySnapshot,
    policy: &AnonymousActionPolicy,
) -> Result<String, WorkflowError> {
    match actor {
        Actor::Anonymous => {
            if policy.permits(action) {
                Ok(EMAIL_ACTOR.to_string())
            } else {
                Err(WorkflowError::AnonymousNotPermitted { action: action.as_str().to_string() })
            }
        }
        Actor::Authenticated(identity) => {
            let expected = expected_approver(document, hierarchy);
            if !identity.active || normalize_email(&identity.email) != normalize_email(&expected) {
                return Err(WorkflowError::Forbidden {
                    actor: identity.email.clone(),
                    expected,
                });
            }
            Ok(identity.email.clone())
        }
    }
}

fn expected_approver(document: &Document, hierarchy: &HierarchySnapshot) -> String {
    if document.approval_type == ApprovalType::Hierarchy {
        // Resolve against the configuration as it exists right now; fall
        // back to the denormalized address when the seat is no longer
        // configured.
        if let Some(assignee) = hierarchy.resolve(document.current_approval_level) {
            return assignee.email;
        }
    }
    document.approver_email.clone()
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
