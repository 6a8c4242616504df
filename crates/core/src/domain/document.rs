use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approver::ApprovalDepartment;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    PurchaseOrder,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::PurchaseOrder => "purchase_order",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "invoice" => Some(Self::Invoice),
            "purchase_order" | "po" => Some(Self::PurchaseOrder),
            _ => None,
        }
    }

    /// Department tag used for department-mode routing.
    pub fn department(&self) -> ApprovalDepartment {
        match self {
            Self::Invoice => ApprovalDepartment::Invoice,
            Self::PurchaseOrder => ApprovalDepartment::PurchaseOrder,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
    OnHold,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::OnHold => "on_hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "on_hold" => Some(Self::OnHold),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

/// Fixed at document creation; the engine never rewrites it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    Hierarchy,
    Department,
    Single,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hierarchy => "hierarchy",
            Self::Department => "department",
            Self::Single => "single",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hierarchy" => Some(Self::Hierarchy),
            "department" => Some(Self::Department),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub document_type: DocumentType,
    pub invoice_number: Option<String>,
    pub po_number: Option<String>,
    pub vendor_info: Option<String>,
    pub total_amount: Decimal,
    pub subtotal: Decimal,
    pub gst_amount: Decimal,
    pub gst_rate: Decimal,
    pub status: DocumentStatus,
    pub status_notes: Option<String>,
    pub approval_type: ApprovalType,
    pub current_approval_level: u32,
    /// Denormalized address of the approver the document is currently waiting on.
    pub approver_email: String,
    pub document_url: Option<String>,
    pub attachments: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    /// Bumped on every persisted mutation; guards concurrent transitions.
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// External reference shown in audit entries and notifications.
    pub fn external_ref(&self) -> &str {
        self.invoice_number
            .as_deref()
            .or(self.po_number.as_deref())
            .unwrap_or(self.id.0.as_str())
    }
}
