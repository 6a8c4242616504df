pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gst;
pub mod hierarchy;
pub mod workflow;

pub use audit::{AuditEntry, AuditQuery};
pub use domain::approver::{ApprovalDepartment, Approver, ApproverId, Role};
pub use domain::document::{
    ApprovalType, Document, DocumentId, DocumentStatus, DocumentType, LineItem,
};
pub use errors::WorkflowError;
pub use gst::GstBreakdown;
pub use hierarchy::{ApprovalRouting, Assignee, HierarchyLevel, HierarchySnapshot};
pub use workflow::actor::{Actor, AnonymousActionPolicy, ApproverIdentity};
pub use workflow::engine::{
    ActionOutcome, ApprovalRequestNotice, DocumentIntake, NotificationError, NotificationGateway,
    StoreError, TransitionGuard, WorkflowEngine, WorkflowStore,
};
pub use workflow::policy::{Transition, WorkflowAction};

pub use chrono;
pub use rust_decimal;
