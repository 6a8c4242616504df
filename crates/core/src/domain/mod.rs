pub mod approver;
pub mod document;
