use serde::{Deserialize, Serialize};

use crate::domain::document::{ApprovalType, Document, DocumentStatus};
use crate::errors::WorkflowError;
use crate::hierarchy::{Assignee, HierarchySnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Approve,
    Reject,
    Hold,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Hold => "hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Some(Self::Approve),
            "reject" | "rejected" => Some(Self::Reject),
            "hold" | "on_hold" => Some(Self::Hold),
            _ => None,
        }
    }
}

/// The computed effect of one workflow action, before anything is persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub status: DocumentStatus,
    pub level: u32,
    /// Audit-log tag; level-suffixed in hierarchy mode so the log reads as a
    /// trail through the chain.
    pub audit_action: String,
    /// Set when the document moves to a new pending approver. The engine
    /// rewrites the document's denormalized address and sends the request
    /// notification from this.
    pub next_approver: Option<Assignee>,
}

impl Transition {
    /// The `status_notes` value this transition writes on the document.
    ///
    /// Reject and hold always leave a note so the document explains its own
    /// state; without caller-supplied text a default is recorded. Every
    /// other transition writes the caller's text or clears the column, so a
    /// note from a previous action never outlives the state it described.
    pub fn status_notes(&self, notes: Option<&str>) -> Option<String> {
        match notes {
            Some(text) => Some(text.to_string()),
            None => match self.status {
                DocumentStatus::Rejected => Some("Rejected".to_string()),
                DocumentStatus::OnHold => Some("Put on hold".to_string()),
                DocumentStatus::Pending | DocumentStatus::Approved => None,
            },
        }
    }
}

/// Decide what `action` does to `document` under the given hierarchy
/// configuration.
///
/// Pure function of its inputs. Terminal documents accept no action at all;
/// a held document can still be approved (resume) or rejected, and holding
/// it again is a no-op that re-records the hold.
pub fn decide(
    document: &Document,
    action: WorkflowAction,
    hierarchy: &HierarchySnapshot,
) -> Result<Transition, WorkflowError> {
    if document.status.is_terminal() {
        return Err(WorkflowError::InvalidTransition { status: document.status });
    }

    let level = document.current_approval_level;
    let tiered = document.approval_type == ApprovalType::Hierarchy;

    match action {
        WorkflowAction::Reject => Ok(Transition {
            status: DocumentStatus::Rejected,
            level,
            audit_action: tag("rejected", tiered, level),
            next_approver: None,
        }),
        WorkflowAction::Hold => Ok(Transition {
            status: DocumentStatus::OnHold,
            level,
            audit_action: tag("on_hold", tiered, level),
            next_approver: None,
        }),
        WorkflowAction::Approve if !tiered => Ok(Transition {
            status: DocumentStatus::Approved,
            level,
            audit_action: "approved".to_string(),
            next_approver: None,
        }),
        WorkflowAction::Approve => Ok(advance(level, hierarchy)),
    }
}

/// Hierarchy-mode approval: sign off at `level` and move the document up the
/// chain, or conclude it.
///
/// With `skip_middle_approver` set, a level-1 approval jumps straight to
/// level 3. A next level with no resolvable seat ends the chain: approval by
/// the highest reachable approver is final.
fn advance(level: u32, hierarchy: &HierarchySnapshot) -> Transition {
    let audit_action = tag("approved", true, level);

    if level >= hierarchy.final_level() {
        return concluded(level, audit_action);
    }

    let next = if hierarchy.skip_middle_approver && level == 1 { 3 } else { level + 1 };

    match hierarchy.resolve(next) {
        Some(assignee) => Transition {
            status: DocumentStatus::Pending,
            level: next,
            audit_action,
            next_approver: Some(assignee),
        },
        None => concluded(level, audit_action),
    }
}

fn concluded(level: u32, audit_action: String) -> Transition {
    Transition { status: DocumentStatus::Approved, level, audit_action, next_approver: None }
}

fn tag(base: &str, tiered: bool, level: u32) -> String {
    if tiered {
        format!("{base}_level_{level}")
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{decide, WorkflowAction};
    use crate::domain::document::DocumentStatus;
    use crate::errors::WorkflowError;
    use crate::hierarchy::{HierarchyLevel, HierarchySnapshot};
    use crate::workflow::test_support::{document_fixture, Mode};

    fn seat(level: u32, name: &str) -> HierarchyLevel {
        HierarchyLevel {
            level,
            name: name.to_string(),
            email: format!("{}@example.test", name.to_ascii_lowercase()),
            active: true,
        }
    }

    fn chain(skip_middle: bool) -> HierarchySnapshot {
        HierarchySnapshot::new(
            1,
            vec![seat(1, "Asha"), seat(2, "Bala"), seat(3, "Chitra")],
            skip_middle,
            Some(seat(4, "Devi")),
        )
    }

    #[test]
    fn action_parse_accepts_past_tense_spellings() {
        assert_eq!(WorkflowAction::parse("approved"), Some(WorkflowAction::Approve));
        assert_eq!(WorkflowAction::parse("Reject"), Some(WorkflowAction::Reject));
        assert_eq!(WorkflowAction::parse("on_hold"), Some(WorkflowAction::Hold));
        assert_eq!(WorkflowAction::parse("escalate"), None);
    }

    #[test]
    fn approval_advances_one_level_at_a_time() {
        let document = document_fixture(Mode::Hierarchy, 1);
        let transition = decide(&document, WorkflowAction::Approve, &chain(false)).unwrap();

        assert_eq!(transition.status, DocumentStatus::Pending);
        assert_eq!(transition.level, 2);
        assert_eq!(transition.audit_action, "approved_level_1");
        assert_eq!(
            transition.next_approver.map(|a| a.email),
            Some("bala@example.test".to_string())
        );
    }

    #[test]
    fn final_level_approval_concludes_the_document() {
        let document = document_fixture(Mode::Hierarchy, 4);
        let transition = decide(&document, WorkflowAction::Approve, &chain(false)).unwrap();

        assert_eq!(transition.status, DocumentStatus::Approved);
        assert_eq!(transition.level, 4);
        assert_eq!(transition.audit_action, "approved_level_4");
        assert!(transition.next_approver.is_none());
    }

    #[test]
    fn skip_middle_jumps_from_level_one_to_three() {
        let document = document_fixture(Mode::Hierarchy, 1);
        let transition = decide(&document, WorkflowAction::Approve, &chain(true)).unwrap();

        assert_eq!(transition.level, 3);
        assert_eq!(
            transition.next_approver.map(|a| a.email),
            Some("chitra@example.test".to_string())
        );
    }

    #[test]
    fn skip_middle_only_applies_to_level_one() {
        let document = document_fixture(Mode::Hierarchy, 3);
        let transition = decide(&document, WorkflowAction::Approve, &chain(true)).unwrap();

        assert_eq!(transition.level, 4);
        assert_eq!(transition.status, DocumentStatus::Pending);
    }

    #[test]
    fn unresolvable_next_seat_ends_the_chain_as_approved() {
        let hierarchy = HierarchySnapshot::new(
            1,
            vec![seat(1, "Asha"), HierarchyLevel { active: false, ..seat(2, "Bala") }],
            false,
            None,
        );
        let document = document_fixture(Mode::Hierarchy, 1);
        let transition = decide(&document, WorkflowAction::Approve, &hierarchy).unwrap();

        assert_eq!(transition.status, DocumentStatus::Approved);
        assert_eq!(transition.level, 1);
        assert!(transition.next_approver.is_none());
    }

    #[test]
    fn rejection_is_terminal_at_any_level() {
        let document = document_fixture(Mode::Hierarchy, 2);
        let transition = decide(&document, WorkflowAction::Reject, &chain(false)).unwrap();

        assert_eq!(transition.status, DocumentStatus::Rejected);
        assert_eq!(transition.level, 2);
        assert_eq!(transition.audit_action, "rejected_level_2");
    }

    #[test]
    fn hold_keeps_the_level_and_is_idempotent() {
        let mut document = document_fixture(Mode::Hierarchy, 2);
        let first = decide(&document, WorkflowAction::Hold, &chain(false)).unwrap();
        assert_eq!(first.status, DocumentStatus::OnHold);
        assert_eq!(first.level, 2);
        assert_eq!(first.audit_action, "on_hold_level_2");

        document.status = DocumentStatus::OnHold;
        let again = decide(&document, WorkflowAction::Hold, &chain(false)).unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn held_document_resumes_on_approval() {
        let mut document = document_fixture(Mode::Hierarchy, 2);
        document.status = DocumentStatus::OnHold;
        let transition = decide(&document, WorkflowAction::Approve, &chain(false)).unwrap();

        assert_eq!(transition.status, DocumentStatus::Pending);
        assert_eq!(transition.level, 3);
    }

    #[test]
    fn terminal_documents_accept_no_action() {
        for status in [DocumentStatus::Approved, DocumentStatus::Rejected] {
            let mut document = document_fixture(Mode::Hierarchy, 1);
            document.status = status;
            for action in [WorkflowAction::Approve, WorkflowAction::Reject, WorkflowAction::Hold] {
                let error = decide(&document, action, &chain(false)).unwrap_err();
                assert_eq!(error, WorkflowError::InvalidTransition { status });
            }
        }
    }

    #[test]
    fn single_mode_approval_concludes_immediately() {
        let document = document_fixture(Mode::Single, 1);
        let transition =
            decide(&document, WorkflowAction::Approve, &HierarchySnapshot::default()).unwrap();

        assert_eq!(transition.status, DocumentStatus::Approved);
        assert_eq!(transition.audit_action, "approved");
        assert!(transition.next_approver.is_none());
    }

    #[test]
    fn missing_notes_fall_back_to_a_default_status_note() {
        let document = document_fixture(Mode::Hierarchy, 1);

        let rejected = decide(&document, WorkflowAction::Reject, &chain(false)).unwrap();
        assert_eq!(rejected.status_notes(None).as_deref(), Some("Rejected"));
        assert_eq!(rejected.status_notes(Some("wrong vendor")).as_deref(), Some("wrong vendor"));

        let held = decide(&document, WorkflowAction::Hold, &chain(false)).unwrap();
        assert_eq!(held.status_notes(None).as_deref(), Some("Put on hold"));

        // Advancing without notes clears whatever the previous action left.
        let advanced = decide(&document, WorkflowAction::Approve, &chain(false)).unwrap();
        assert_eq!(advanced.status_notes(None), None);
    }

    #[test]
    fn department_mode_tags_are_not_level_suffixed() {
        let document = document_fixture(Mode::Department, 1);
        let transition =
            decide(&document, WorkflowAction::Reject, &HierarchySnapshot::default()).unwrap();
        assert_eq!(transition.audit_action, "rejected");
    }
}
