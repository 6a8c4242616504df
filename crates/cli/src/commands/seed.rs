use crate::commands::{self, CommandResult};
use apflow_db::{connect_with_settings, migrations, seed_demo};

pub fn run() -> CommandResult {
    let ctx = match commands::init("seed") {
        Ok(ctx) => ctx,
        Err(result) => return result,
    };

    let result = ctx.runtime.block_on(async {
        let pool = connect_with_settings(
            &ctx.config.database.url,
            ctx.config.database.max_connections,
            ctx.config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let summary = seed_demo(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(summary)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "seed",
            format!(
                "demo dataset loaded: {} approvers, {} hierarchy levels, {} documents",
                summary.approvers, summary.hierarchy_levels, summary.documents
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
