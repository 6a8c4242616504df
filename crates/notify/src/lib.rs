//! Email notifications for the approval workflow.
//!
//! The engine commits a transition first and hands the resulting
//! [`ApprovalRequestNotice`](apflow_core::ApprovalRequestNotice) to the
//! gateway afterwards; nothing here can roll a workflow action back.
//!
//! - **Transport** (`transport`) - pluggable relay seam with an HTTP
//!   implementation and test doubles
//! - **Messages** (`message`) - subject/body assembly with emailed action
//!   links
//! - **Gateway** (`gateway`) - the `NotificationGateway` implementation the
//!   engine is wired with

pub mod gateway;
pub mod message;
pub mod transport;

pub use gateway::EmailNotificationGateway;
pub use message::{approval_request_email, OutboundEmail};
pub use transport::{
    HttpMailTransport, MailTransport, NoopMailTransport, RecordingMailTransport, TransportError,
};
