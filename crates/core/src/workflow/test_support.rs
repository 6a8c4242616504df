use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::document::{
    ApprovalType, Document, DocumentId, DocumentStatus, DocumentType,
};

#[derive(Clone, Copy, Debug)]
pub enum Mode {
    Hierarchy,
    Department,
    Single,
}

/// A pending invoice parked at `level`, waiting on `pending@example.test`.
pub fn document_fixture(mode: Mode, level: u32) -> Document {
    let now = Utc::now();
    Document {
        id: DocumentId("doc-1".to_string()),
        document_type: DocumentType::Invoice,
        invoice_number: Some("INV-1001".to_string()),
        po_number: None,
        vendor_info: Some("Acme Supplies".to_string()),
        total_amount: Decimal::new(100_000, 2),
        subtotal: Decimal::new(84_746, 2),
        gst_amount: Decimal::new(15_254, 2),
        gst_rate: Decimal::from(18),
        status: DocumentStatus::Pending,
        status_notes: None,
        approval_type: match mode {
            Mode::Hierarchy => ApprovalType::Hierarchy,
            Mode::Department => ApprovalType::Department,
            Mode::Single => ApprovalType::Single,
        },
        current_approval_level: level,
        approver_email: "pending@example.test".to_string(),
        document_url: None,
        attachments: Vec::new(),
        custom_fields: BTreeMap::new(),
        revision: 1,
        created_at: now,
        updated_at: now,
    }
}
