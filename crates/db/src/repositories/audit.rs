use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use apflow_core::audit::{AuditEntry, AuditQuery};
use apflow_core::domain::document::DocumentId;

use super::{decode_err, unknown_variant, AuditLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAuditLogRepository {
    pool: DbPool,
}

impl SqlAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let document_id: String = row.try_get("document_id").map_err(decode_err)?;
    let occurred_at: String = row.try_get("occurred_at").map_err(decode_err)?;

    Ok(AuditEntry {
        id: row.try_get("id").map_err(decode_err)?,
        document_id: DocumentId(document_id),
        external_ref: row.try_get("external_ref").map_err(decode_err)?,
        action: row.try_get("action").map_err(decode_err)?,
        actor: row.try_get("actor").map_err(decode_err)?,
        notes: row.try_get("notes").map_err(decode_err)?,
        occurred_at: DateTime::parse_from_rfc3339(&occurred_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| unknown_variant("occurred_at", &occurred_at))?,
    })
}

#[async_trait]
impl AuditLogRepository for SqlAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
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
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent first; filters combine with AND.
    async fn query(&self, filter: &AuditQuery) -> Result<Vec<AuditEntry>, RepositoryError> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
            "SELECT id, document_id, external_ref, action, actor, notes, occurred_at
             FROM audit_log WHERE 1 = 1",
        );

        if let Some(document_id) = &filter.document_id {
            builder.push(" AND document_id = ");
            builder.push_bind(&document_id.0);
        }
        if let Some(action) = &filter.action {
            builder.push(" AND action = ");
            builder.push_bind(action);
        }
        if let Some(actor) = &filter.actor {
            builder.push(" AND actor = ");
            builder.push_bind(actor);
        }
        if let Some(from) = &filter.from {
            builder.push(" AND occurred_at >= ");
            builder.push_bind(from.to_rfc3339());
        }
        if let Some(to) = &filter.to {
            builder.push(" AND occurred_at <= ");
            builder.push_bind(to.to_rfc3339());
        }

        builder.push(" ORDER BY occurred_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }
}
