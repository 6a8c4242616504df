use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use apflow_core::audit::AuditEntry;
use apflow_core::domain::document::{
    ApprovalType, Document, DocumentId, DocumentStatus, DocumentType, LineItem,
};
use apflow_core::gst::GstBreakdown;
use apflow_core::workflow::engine::{StoreError, TransitionGuard, WorkflowStore};
use apflow_core::workflow::policy::Transition;

use super::{decode_err, parse_document_type, unknown_variant, DocumentRepository, RepositoryError};
use crate::DbPool;

const DOCUMENT_COLUMNS: &str = "id, document_type, invoice_number, po_number, vendor_info,
        total_amount, subtotal, gst_amount, gst_rate, status, status_notes,
        approval_type, current_approval_level, approver_email, document_url,
        attachments_json, custom_fields_json, revision, created_at, updated_at";

#[derive(Clone, Debug, Default)]
pub struct DocumentListQuery {
    /// Matched case-insensitively against invoice number, PO number, and
    /// vendor info.
    pub search: Option<String>,
    pub status: Option<DocumentStatus>,
    pub document_type: Option<DocumentType>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub struct DocumentListPage {
    pub documents: Vec<Document>,
    /// Row count before the search filter, for paging displays.
    pub total: u64,
    /// Row count after filtering, before limit/offset.
    pub filtered: u64,
}

pub struct SqlDocumentRepository {
    pool: DbPool,
}

impl SqlDocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|_| unknown_variant(column, value))
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| unknown_variant(column, value))
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let document_type: String = row.try_get("document_type").map_err(decode_err)?;
    let invoice_number: Option<String> = row.try_get("invoice_number").map_err(decode_err)?;
    let po_number: Option<String> = row.try_get("po_number").map_err(decode_err)?;
    let vendor_info: Option<String> = row.try_get("vendor_info").map_err(decode_err)?;
    let total_amount: String = row.try_get("total_amount").map_err(decode_err)?;
    let subtotal: String = row.try_get("subtotal").map_err(decode_err)?;
    let gst_amount: String = row.try_get("gst_amount").map_err(decode_err)?;
    let gst_rate: String = row.try_get("gst_rate").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let status_notes: Option<String> = row.try_get("status_notes").map_err(decode_err)?;
    let approval_type: String = row.try_get("approval_type").map_err(decode_err)?;
    let current_approval_level: i64 =
        row.try_get("current_approval_level").map_err(decode_err)?;
    let approver_email: String = row.try_get("approver_email").map_err(decode_err)?;
    let document_url: Option<String> = row.try_get("document_url").map_err(decode_err)?;
    let attachments_json: String = row.try_get("attachments_json").map_err(decode_err)?;
    let custom_fields_json: String = row.try_get("custom_fields_json").map_err(decode_err)?;
    let revision: i64 = row.try_get("revision").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    let attachments: Vec<String> =
        serde_json::from_str(&attachments_json).map_err(decode_err)?;
    let custom_fields: BTreeMap<String, String> =
        serde_json::from_str(&custom_fields_json).map_err(decode_err)?;

    Ok(Document {
        id: DocumentId(id),
        document_type: parse_document_type(&document_type)?,
        invoice_number,
        po_number,
        vendor_info,
        total_amount: parse_decimal("total_amount", &total_amount)?,
        subtotal: parse_decimal("subtotal", &subtotal)?,
        gst_amount: parse_decimal("gst_amount", &gst_amount)?,
        gst_rate: parse_decimal("gst_rate", &gst_rate)?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| unknown_variant("status", &status))?,
        status_notes,
        approval_type: ApprovalType::parse(&approval_type)
            .ok_or_else(|| unknown_variant("approval_type", &approval_type))?,
        current_approval_level: u32::try_from(current_approval_level)
            .map_err(|_| unknown_variant("current_approval_level", &current_approval_level.to_string()))?,
        approver_email,
        document_url,
        attachments,
        custom_fields,
        revision: u32::try_from(revision)
            .map_err(|_| unknown_variant("revision", &revision.to_string()))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn row_to_line_item(row: &sqlx::sqlite::SqliteRow) -> Result<LineItem, RepositoryError> {
    let description: String = row.try_get("description").map_err(decode_err)?;
    let quantity: String = row.try_get("quantity").map_err(decode_err)?;
    let unit_price: String = row.try_get("unit_price").map_err(decode_err)?;
    let total: String = row.try_get("total").map_err(decode_err)?;

    Ok(LineItem {
        description,
        quantity: parse_decimal("quantity", &quantity)?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        total: parse_decimal("total", &total)?,
    })
}

async fn append_audit<'a>(
    tx: &mut sqlx::Transaction<'a, sqlx::Sqlite>,
    entry: &AuditEntry,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_log (id, document_id, external_ref, action, actor, notes, occurred_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.document_id.0)
    .bind(&entry.external_ref)
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(&entry.notes)
    .bind(entry.occurred_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

#[async_trait]
impl WorkflowStore for SqlDocumentRepository {
    async fn fetch_document(&self, id: &DocumentId) -> Result<Document, StoreError> {
        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(ref row) => {
                row_to_document(row).map_err(|error| StoreError::Backend(error.to_string()))
            }
            None => Err(StoreError::NotFound(id.0.clone())),
        }
    }

    async fn insert_document(
        &self,
        document: &Document,
        line_items: &[LineItem],
        entry: &AuditEntry,
    ) -> Result<(), StoreError> {
        let attachments_json =
            serde_json::to_string(&document.attachments).unwrap_or_else(|_| "[]".to_string());
        let custom_fields_json =
            serde_json::to_string(&document.custom_fields).unwrap_or_else(|_| "{}".to_string());

        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO document (id, document_type, invoice_number, po_number, vendor_info,
                                   total_amount, subtotal, gst_amount, gst_rate, status,
                                   status_notes, approval_type, current_approval_level,
                                   approver_email, document_url, attachments_json,
                                   custom_fields_json, revision, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id.0)
        .bind(document.document_type.as_str())
        .bind(&document.invoice_number)
        .bind(&document.po_number)
        .bind(&document.vendor_info)
        .bind(document.total_amount.to_string())
        .bind(document.subtotal.to_string())
        .bind(document.gst_amount.to_string())
        .bind(document.gst_rate.to_string())
        .bind(document.status.as_str())
        .bind(&document.status_notes)
        .bind(document.approval_type.as_str())
        .bind(document.current_approval_level)
        .bind(&document.approver_email)
        .bind(&document.document_url)
        .bind(&attachments_json)
        .bind(&custom_fields_json)
        .bind(document.revision)
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        for item in line_items {
            sqlx::query(
                "INSERT INTO line_item (document_id, description, quantity, unit_price, total)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&document.id.0)
            .bind(&item.description)
            .bind(item.quantity.to_string())
            .bind(item.unit_price.to_string())
            .bind(item.total.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        append_audit(&mut tx, entry).await.map_err(backend)?;
        tx.commit().await.map_err(backend)?;
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
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // The WHERE clause carries the guard: a concurrent writer that got
        // there first changed status, level, or revision, so this UPDATE
        // matches nothing and the action is refused.
        let next_email = transition.next_approver.as_ref().map(|assignee| assignee.email.clone());
        let result = sqlx::query(
            "UPDATE document
             SET status = ?,
                 current_approval_level = ?,
                 approver_email = COALESCE(?, approver_email),
                 status_notes = ?,
                 revision = revision + 1,
                 updated_at = ?
             WHERE id = ? AND status = ? AND current_approval_level = ? AND revision = ?",
        )
        .bind(transition.status.as_str())
        .bind(transition.level)
        .bind(&next_email)
        .bind(status_notes)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(guard.status.as_str())
        .bind(guard.current_approval_level)
        .bind(guard.revision)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM document WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?
                .is_some();
            return if exists {
                Err(StoreError::Conflict(id.0.clone()))
            } else {
                Err(StoreError::NotFound(id.0.clone()))
            };
        }

        append_audit(&mut tx, entry).await.map_err(backend)?;

        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = ?"))
            .bind(&id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let updated =
            row_to_document(&row).map_err(|error| StoreError::Backend(error.to_string()))?;

        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn update_amounts(
        &self,
        id: &DocumentId,
        guard: &TransitionGuard,
        amounts: &GstBreakdown,
        entry: &AuditEntry,
    ) -> Result<Document, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            "UPDATE document
             SET total_amount = ?, subtotal = ?, gst_amount = ?, gst_rate = ?,
                 status = 'pending', revision = revision + 1, updated_at = ?
             WHERE id = ? AND status = ? AND current_approval_level = ? AND revision = ?",
        )
        .bind(amounts.total_amount.to_string())
        .bind(amounts.subtotal.to_string())
        .bind(amounts.gst_amount.to_string())
        .bind(amounts.rate.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .bind(guard.status.as_str())
        .bind(guard.current_approval_level)
        .bind(guard.revision)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM document WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?
                .is_some();
            return if exists {
                Err(StoreError::Conflict(id.0.clone()))
            } else {
                Err(StoreError::NotFound(id.0.clone()))
            };
        }

        append_audit(&mut tx, entry).await.map_err(backend)?;

        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = ?"))
            .bind(&id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let updated =
            row_to_document(&row).map_err(|error| StoreError::Backend(error.to_string()))?;

        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }
}

#[async_trait]
impl DocumentRepository for SqlDocumentRepository {
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM document WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_document(row)?)),
            None => Ok(None),
        }
    }

    async fn line_items(&self, id: &DocumentId) -> Result<Vec<LineItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT description, quantity, unit_price, total
             FROM line_item WHERE document_id = ? ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line_item).collect()
    }

    async fn list(&self, query: &DocumentListQuery) -> Result<DocumentListPage, RepositoryError> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM document WHERE 1 = 1"
        ));
        push_filters(&mut builder, query);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(query.limit.max(1));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let documents =
            rows.iter().map(row_to_document).collect::<Result<Vec<_>, _>>()?;

        let mut filtered_builder =
            sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT COUNT(*) AS count FROM document WHERE 1 = 1");
        push_filters(&mut filtered_builder, query);
        let filtered: i64 =
            filtered_builder.build().fetch_one(&self.pool).await?.get("count");

        let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM document")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        Ok(DocumentListPage {
            documents,
            total: total.max(0) as u64,
            filtered: filtered.max(0) as u64,
        })
    }

    async fn count_by_status(&self, status: DocumentStatus) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM document WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?
            .get("count");
        Ok(count.max(0) as u64)
    }
}

fn push_filters<'a>(
    builder: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>,
    query: &'a DocumentListQuery,
) {
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    if let Some(document_type) = query.document_type {
        builder.push(" AND document_type = ");
        builder.push_bind(document_type.as_str());
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim().to_ascii_lowercase());
        builder.push(
            " AND (LOWER(IFNULL(invoice_number, '')) LIKE ",
        );
        builder.push_bind(pattern.clone());
        builder.push(" OR LOWER(IFNULL(po_number, '')) LIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR LOWER(IFNULL(vendor_info, '')) LIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }
}
