use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::approver::{ApprovalDepartment, Approver};

/// One configured seat in the global approval chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    pub level: u32,
    pub name: String,
    pub email: String,
    pub active: bool,
}

/// A resolved approver seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub name: String,
    pub email: String,
}

/// An immutable, versioned view of the approval hierarchy configuration.
///
/// The hierarchy is global shared configuration, but callers load a snapshot
/// and pass it into the engine per call, so a document in flight resolves its
/// next approver against the configuration as it exists at the moment of
/// transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    pub version: u32,
    pub levels: Vec<HierarchyLevel>,
    pub skip_middle_approver: bool,
    /// The implicit final seat at `max(configured level) + 1` (the CFO seat).
    pub final_approver: Option<HierarchyLevel>,
}

impl HierarchySnapshot {
    pub fn new(
        version: u32,
        mut levels: Vec<HierarchyLevel>,
        skip_middle_approver: bool,
        final_approver: Option<HierarchyLevel>,
    ) -> Self {
        levels.sort_by_key(|entry| entry.level);
        Self { version, levels, skip_middle_approver, final_approver }
    }

    /// Highest explicitly configured level, 0 when none are configured.
    pub fn max_level(&self) -> u32 {
        self.levels.iter().map(|entry| entry.level).max().unwrap_or(0)
    }

    /// Terminal level of the chain: every configured level plus the implicit
    /// final seat. Sign-off at this level is what makes a document approved.
    pub fn final_level(&self) -> u32 {
        self.max_level() + 1
    }

    /// Resolve the approver seated at `level`. Inactive seats never resolve.
    pub fn resolve(&self, level: u32) -> Option<Assignee> {
        if level == self.final_level() {
            return self
                .final_approver
                .as_ref()
                .filter(|seat| seat.active)
                .map(|seat| Assignee { name: seat.name.clone(), email: seat.email.clone() });
        }

        self.levels
            .iter()
            .find(|entry| entry.level == level && entry.active)
            .map(|entry| Assignee { name: entry.name.clone(), email: entry.email.clone() })
    }
}

/// Everything document creation needs to pick an initial approver, loaded as
/// one consistent unit so a single intake never mixes configuration versions.
#[derive(Clone, Debug, Default)]
pub struct ApprovalRouting {
    pub hierarchy: HierarchySnapshot,
    pub departments: BTreeMap<ApprovalDepartment, Vec<Approver>>,
    pub single_approver: Option<Approver>,
}

impl Default for HierarchySnapshot {
    fn default() -> Self {
        Self { version: 0, levels: Vec::new(), skip_middle_approver: false, final_approver: None }
    }
}

impl ApprovalRouting {
    /// First active approver assigned to a department tag.
    pub fn first_department_approver(&self, department: ApprovalDepartment) -> Option<&Approver> {
        self.departments
            .get(&department)
            .and_then(|assignees| assignees.iter().find(|approver| approver.active))
    }

    pub fn active_single_approver(&self) -> Option<&Approver> {
        self.single_approver.as_ref().filter(|approver| approver.active)
    }
}

#[cfg(test)]
mod tests {
    use super::{HierarchyLevel, HierarchySnapshot};

    fn seat(level: u32, name: &str, active: bool) -> HierarchyLevel {
        HierarchyLevel {
            level,
            name: name.to_string(),
            email: format!("{}@example.test", name.to_ascii_lowercase()),
            active,
        }
    }

    fn snapshot() -> HierarchySnapshot {
        HierarchySnapshot::new(
            1,
            vec![seat(2, "Bala", true), seat(1, "Asha", true)],
            false,
            Some(seat(3, "Chitra", true)),
        )
    }

    #[test]
    fn final_level_is_max_configured_plus_one() {
        assert_eq!(snapshot().max_level(), 2);
        assert_eq!(snapshot().final_level(), 3);
    }

    #[test]
    fn resolve_returns_configured_seats_and_the_final_seat() {
        let snapshot = snapshot();
        assert_eq!(snapshot.resolve(1).map(|a| a.name), Some("Asha".to_string()));
        assert_eq!(snapshot.resolve(2).map(|a| a.name), Some("Bala".to_string()));
        assert_eq!(snapshot.resolve(3).map(|a| a.name), Some("Chitra".to_string()));
        assert_eq!(snapshot.resolve(4), None);
    }

    #[test]
    fn inactive_seats_never_resolve() {
        let snapshot = HierarchySnapshot::new(
            1,
            vec![seat(1, "Asha", true), seat(2, "Bala", false)],
            false,
            Some(seat(3, "Chitra", false)),
        );
        assert!(snapshot.resolve(2).is_none());
        assert!(snapshot.resolve(3).is_none());
    }

    #[test]
    fn empty_hierarchy_terminates_at_level_one() {
        let snapshot = HierarchySnapshot::default();
        assert_eq!(snapshot.final_level(), 1);
        assert_eq!(snapshot.resolve(1), None);
    }

    #[test]
    fn levels_are_kept_sorted() {
        let snapshot = snapshot();
        let levels: Vec<u32> = snapshot.levels.iter().map(|entry| entry.level).collect();
        assert_eq!(levels, vec![1, 2]);
    }
}
