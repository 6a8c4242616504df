//! Demo dataset for local development and end-to-end checks: a two-level
//! hierarchy with a final approver, a small approver directory, and a couple
//! of pending documents.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use apflow_core::audit::AuditEntry;
use apflow_core::domain::approver::{ApprovalDepartment, Approver, ApproverId, Role};
use apflow_core::domain::document::{
    ApprovalType, Document, DocumentId, DocumentStatus, DocumentType, LineItem,
};
use apflow_core::gst::GstBreakdown;
use apflow_core::hierarchy::{Assignee, HierarchyLevel};
use apflow_core::workflow::engine::WorkflowStore;

use crate::repositories::{
    HierarchyRepository, HierarchySettingsUpdate, RepositoryError, SqlDocumentRepository,
    SqlHierarchyRepository,
};
use crate::DbPool;

#[derive(Clone, Copy, Debug, Default)]
pub struct SeedSummary {
    pub approvers: usize,
    pub hierarchy_levels: usize,
    pub documents: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("seed document write failed: {0}")]
    Store(#[from] apflow_core::workflow::engine::StoreError),
}

fn directory() -> Vec<Approver> {
    let entry = |id: &str, name: &str, role, department| Approver {
        id: ApproverId(id.to_string()),
        name: name.to_string(),
        email: format!("{}@example.test", name.to_ascii_lowercase()),
        role,
        department,
        active: true,
    };

    vec![
        entry("ap-asha", "Asha", Role::Approver, ApprovalDepartment::Invoice),
        entry("ap-bala", "Bala", Role::Approver, ApprovalDepartment::Invoice),
        entry("ap-chitra", "Chitra", Role::Admin, ApprovalDepartment::Invoice),
        entry("ap-meera", "Meera", Role::Approver, ApprovalDepartment::Invoice),
        entry("ap-omar", "Omar", Role::Approver, ApprovalDepartment::PurchaseOrder),
    ]
}

fn sample_document(
    id: &str,
    document_type: DocumentType,
    number: &str,
    vendor: &str,
    total: Decimal,
) -> (Document, Vec<LineItem>) {
    let amounts = GstBreakdown::inclusive(total, Decimal::from(18));
    let now = Utc::now();
    let (invoice_number, po_number) = match document_type {
        DocumentType::Invoice => (Some(number.to_string()), None),
        DocumentType::PurchaseOrder => (None, Some(number.to_string())),
    };

    let document = Document {
        id: DocumentId(id.to_string()),
        document_type,
        invoice_number,
        po_number,
        vendor_info: Some(vendor.to_string()),
        total_amount: amounts.total_amount,
        subtotal: amounts.subtotal,
        gst_amount: amounts.gst_amount,
        gst_rate: amounts.rate,
        status: DocumentStatus::Pending,
        status_notes: None,
        approval_type: ApprovalType::Hierarchy,
        current_approval_level: 1,
        approver_email: "asha@example.test".to_string(),
        document_url: None,
        attachments: Vec::new(),
        custom_fields: BTreeMap::new(),
        revision: 1,
        created_at: now,
        updated_at: now,
    };
    let items = vec![LineItem {
        description: format!("{vendor} delivery"),
        quantity: Decimal::ONE,
        unit_price: amounts.subtotal,
        total: amounts.subtotal,
    }];
    (document, items)
}

/// Idempotence is not a goal here: seeding twice duplicates documents, so
/// callers run it against a fresh database.
pub async fn seed_demo(pool: &DbPool) -> Result<SeedSummary, SeedError> {
    let hierarchy = SqlHierarchyRepository::new(pool.clone());
    let documents = SqlDocumentRepository::new(pool.clone());

    let approvers = directory();
    for approver in &approvers {
        hierarchy.upsert_approver(approver).await?;
    }
    hierarchy
        .set_department_order(
            ApprovalDepartment::Invoice,
            &[ApproverId("ap-meera".to_string()), ApproverId("ap-bala".to_string())],
        )
        .await?;
    hierarchy
        .set_department_order(
            ApprovalDepartment::PurchaseOrder,
            &[ApproverId("ap-omar".to_string())],
        )
        .await?;

    let levels = vec![
        HierarchyLevel {
            level: 1,
            name: "Asha".to_string(),
            email: "asha@example.test".to_string(),
            active: true,
        },
        HierarchyLevel {
            level: 2,
            name: "Bala".to_string(),
            email: "bala@example.test".to_string(),
            active: true,
        },
    ];
    hierarchy.replace_levels(&levels).await?;
    hierarchy
        .update_settings(&HierarchySettingsUpdate {
            skip_middle_approver: Some(false),
            final_approver: Some(Assignee {
                name: "Chitra".to_string(),
                email: "chitra@example.test".to_string(),
            }),
            single_approver_email: Some("meera@example.test".to_string()),
            ..HierarchySettingsUpdate::default()
        })
        .await?;

    let samples = vec![
        sample_document(
            &format!("doc-{}", Uuid::new_v4()),
            DocumentType::Invoice,
            "INV-1001",
            "Acme Supplies",
            Decimal::new(118_000, 2),
        ),
        sample_document(
            &format!("doc-{}", Uuid::new_v4()),
            DocumentType::PurchaseOrder,
            "PO-7001",
            "Borealis Traders",
            Decimal::new(59_000, 2),
        ),
    ];
    let document_count = samples.len();
    for (document, items) in &samples {
        let entry = AuditEntry::new(
            document.id.clone(),
            document.external_ref(),
            "created",
            "seed",
            None,
        );
        documents.insert_document(document, items, &entry).await?;
    }

    Ok(SeedSummary {
        approvers: approvers.len(),
        hierarchy_levels: levels.len(),
        documents: document_count,
    })
}
