pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "apflow",
    about = "Apflow operator CLI",
    long_about = "Operate the invoice/PO approval workflow: migrations, demo data, config inspection, document intake, and approval actions.",
    after_help = "Examples:\n  apflow doctor --json\n  apflow intake --doc-type invoice --number INV-1001 --vendor \"Acme Supplies\" --total 1180.00\n  apflow act --document <id> --action approve --actor-email asha@example.test"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply any pending database migrations")]
    Migrate,
    #[command(about = "Load the demo dataset (hierarchy, approvers, sample documents)")]
    Seed,
    #[command(about = "Validate config, database connectivity, and approval configuration")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Submit a document into the approval workflow")]
    Intake(commands::intake::IntakeArgs),
    #[command(about = "Apply an approve/reject/hold action to a document")]
    Act(commands::act::ActArgs),
    #[command(about = "Query the append-only audit log")]
    Audit(commands::audit::AuditArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Intake(args) => commands::intake::run(args),
        Command::Act(args) => commands::act::run(args),
        Command::Audit(args) => commands::audit::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
