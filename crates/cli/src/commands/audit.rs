use clap::Args;

use apflow_core::chrono::{DateTime, Utc};
use apflow_core::{AuditEntry, AuditQuery, DocumentId};
use apflow_db::connect_with_settings;
use apflow_db::repositories::{AuditLogRepository, SqlAuditLogRepository};

use crate::commands::{self, CommandResult};

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Restrict to one document id
    #[arg(long)]
    pub document: Option<String>,
    /// Restrict to one audit action, e.g. `approved_level_2`
    #[arg(long)]
    pub action: Option<String>,
    /// Restrict to entries recorded by this actor
    #[arg(long)]
    pub actor: Option<String>,
    /// Only entries at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<String>,
    /// Only entries at or before this RFC 3339 timestamp
    #[arg(long)]
    pub until: Option<String>,
    /// Maximum number of entries (newest first)
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}

pub fn run(args: AuditArgs) -> CommandResult {
    let ctx = match commands::init("audit") {
        Ok(ctx) => ctx,
        Err(result) => return result,
    };

    let from = match parse_timestamp(args.since.as_deref()) {
        Ok(from) => from,
        Err(message) => return CommandResult::failure("audit", "argument_validation", message, 2),
    };
    let to = match parse_timestamp(args.until.as_deref()) {
        Ok(to) => to,
        Err(message) => return CommandResult::failure("audit", "argument_validation", message, 2),
    };

    let filter = AuditQuery {
        document_id: args.document.clone().map(DocumentId),
        action: args.action.clone(),
        actor: args.actor.clone(),
        from,
        to,
        limit: Some(args.limit),
    };

    let result = ctx.runtime.block_on(async {
        let pool = connect_with_settings(
            &ctx.config.database.url,
            ctx.config.database.max_connections,
            ctx.config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let entries = SqlAuditLogRepository::new(pool.clone())
            .query(&filter)
            .await
            .map_err(|error| ("persistence", error.to_string(), 1u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(entries)
    });

    match result {
        Ok(entries) => CommandResult::success("audit", render_entries(&entries)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("audit", error_class, message, exit_code)
        }
    }
}

fn parse_timestamp(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|_| format!("`{raw}` is not a valid RFC 3339 timestamp"))
}

fn render_entries(entries: &[AuditEntry]) -> String {
    if entries.is_empty() {
        return "no audit entries matched".to_string();
    }

    let mut lines = vec![format!("{} audit entries (newest first):", entries.len())];
    for entry in entries {
        let notes = entry.notes.as_deref().map(|notes| format!(" ({notes})")).unwrap_or_default();
        lines.push(format!(
            "{} {} {} by {} [{}]{}",
            entry.occurred_at.to_rfc3339(),
            entry.external_ref,
            entry.action,
            entry.actor,
            entry.document_id.0,
            notes
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use apflow_core::{AuditEntry, DocumentId};

    use super::{parse_timestamp, render_entries};

    #[test]
    fn timestamps_must_be_rfc3339() {
        assert!(parse_timestamp(None).expect("absent is fine").is_none());
        assert!(parse_timestamp(Some("2026-08-01T00:00:00Z")).expect("valid").is_some());
        assert!(parse_timestamp(Some("yesterday")).is_err());
    }

    #[test]
    fn rendering_includes_action_actor_and_notes() {
        let entry = AuditEntry::new(
            DocumentId("doc-1".to_string()),
            "INV-1001",
            "rejected_level_2",
            "bala@example.test",
            Some("missing PO reference".to_string()),
        );

        let rendered = render_entries(&[entry]);
        assert!(rendered.contains("rejected_level_2"));
        assert!(rendered.contains("bala@example.test"));
        assert!(rendered.contains("missing PO reference"));
    }

    #[test]
    fn empty_result_sets_say_so() {
        assert_eq!(render_entries(&[]), "no audit entries matched");
    }
}
