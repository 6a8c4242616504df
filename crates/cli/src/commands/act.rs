use std::sync::Arc;

use clap::Args;

use apflow_core::{
    Actor, ApproverIdentity, DocumentId, WorkflowAction, WorkflowEngine,
};
use apflow_db::connect_with_settings;
use apflow_db::repositories::{HierarchyRepository, SqlDocumentRepository, SqlHierarchyRepository};

use crate::commands::{self, CommandResult};

#[derive(Debug, Args)]
pub struct ActArgs {
    /// Document id to act on
    #[arg(long)]
    pub document: String,
    /// Action to apply: `approve`, `reject`, or `hold`
    #[arg(long)]
    pub action: String,
    /// Acting approver's email; omitted means the anonymous email-link path
    #[arg(long = "actor-email")]
    pub actor_email: Option<String>,
    /// Free-form notes recorded with the transition
    #[arg(long)]
    pub notes: Option<String>,
}

pub fn run(args: ActArgs) -> CommandResult {
    let ctx = match commands::init("act") {
        Ok(ctx) => ctx,
        Err(result) => return result,
    };

    let action = match WorkflowAction::parse(&args.action) {
        Some(action) => action,
        None => {
            return CommandResult::failure(
                "act",
                "argument_validation",
                format!("unknown action `{}` (expected approve, reject, or hold)", args.action),
                2,
            );
        }
    };

    if args.actor_email.is_none() && !ctx.config.intake.allow_email_actions {
        return CommandResult::failure(
            "act",
            "forbidden",
            "anonymous actions are disabled; pass --actor-email",
            1,
        );
    }

    let gateway = match commands::build_gateway(&ctx.config) {
        Ok(gateway) => gateway,
        Err(message) => return CommandResult::failure("act", "config_validation", message, 2),
    };

    let result = ctx.runtime.block_on(async {
        let pool = connect_with_settings(
            &ctx.config.database.url,
            ctx.config.database.max_connections,
            ctx.config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let hierarchy_repo = SqlHierarchyRepository::new(pool.clone());
        let snapshot = hierarchy_repo
            .load_snapshot()
            .await
            .map_err(|error| ("persistence", error.to_string(), 1u8))?;

        let actor = match &args.actor_email {
            Some(email) => {
                let identity = resolve_identity(&hierarchy_repo, email)
                    .await
                    .map_err(|error| ("persistence", error, 1u8))?;
                Actor::Authenticated(identity)
            }
            None => Actor::Anonymous,
        };

        let engine =
            WorkflowEngine::new(Arc::new(SqlDocumentRepository::new(pool.clone())), gateway);
        let outcome = engine
            .apply_action(
                &DocumentId(args.document.clone()),
                action,
                &actor,
                args.notes.clone(),
                &snapshot,
            )
            .await
            .map_err(|error| (commands::workflow_error_class(&error), error.to_string(), 1u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(outcome)
    });

    match result {
        Ok(outcome) => CommandResult::success(
            "act",
            format!(
                "recorded `{}`: document {} is now {} at level {}; notification {}",
                outcome.audit_action,
                outcome.document.id.0,
                outcome.document.status.as_str(),
                outcome.document.current_approval_level,
                if outcome.notified { "sent" } else { "not sent" }
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("act", error_class, message, exit_code)
        }
    }
}

/// Look the actor up in the approver directory. Emails outside the directory
/// still act (hierarchy seats are configured by email, not directory rows)
/// but get no display name and are presumed active; the engine's approver
/// check decides whether they may touch the document.
async fn resolve_identity(
    repo: &SqlHierarchyRepository,
    email: &str,
) -> Result<ApproverIdentity, String> {
    let approvers = repo.list_approvers().await.map_err(|error| error.to_string())?;
    let wanted = email.trim().to_ascii_lowercase();

    Ok(approvers
        .into_iter()
        .find(|approver| approver.email.trim().to_ascii_lowercase() == wanted)
        .map(|approver| ApproverIdentity {
            name: approver.name,
            email: approver.email,
            active: approver.active,
        })
        .unwrap_or_else(|| ApproverIdentity {
            name: email.to_string(),
            email: email.to_string(),
            active: true,
        }))
}
