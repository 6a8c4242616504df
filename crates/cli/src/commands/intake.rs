use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Args;
use rust_decimal::Decimal;

use apflow_core::{
    ApprovalType, DocumentIntake, DocumentType, LineItem, WorkflowEngine,
};
use apflow_db::repositories::{HierarchyRepository, SqlDocumentRepository, SqlHierarchyRepository};
use apflow_db::{connect_with_settings, migrations};

use crate::commands::{self, CommandResult};

#[derive(Debug, Args)]
pub struct IntakeArgs {
    /// Document type: `invoice` or `po`
    #[arg(long = "doc-type")]
    pub doc_type: String,
    /// Invoice or purchase order number
    #[arg(long)]
    pub number: String,
    /// Vendor name or free-form vendor details
    #[arg(long)]
    pub vendor: Option<String>,
    /// GST-inclusive total amount
    #[arg(long)]
    pub total: String,
    /// GST percentage; falls back to the configured default rate
    #[arg(long = "gst-rate")]
    pub gst_rate: Option<String>,
    /// Approval mode: `hierarchy`, `department`, or `single`
    #[arg(long, default_value = "hierarchy")]
    pub approval: String,
    /// Link to the source document (PDF, scan, drive URL)
    #[arg(long = "document-url")]
    pub document_url: Option<String>,
    /// Identity recorded as the submitter in the audit log
    #[arg(long = "submitted-by")]
    pub submitted_by: Option<String>,
    /// Line item as `description|quantity|unit_price`; repeatable
    #[arg(long = "line")]
    pub lines: Vec<String>,
}

pub fn run(args: IntakeArgs) -> CommandResult {
    let ctx = match commands::init("intake") {
        Ok(ctx) => ctx,
        Err(result) => return result,
    };

    let document_type = match DocumentType::parse(&args.doc_type) {
        Some(document_type) => document_type,
        None => {
            return CommandResult::failure(
                "intake",
                "argument_validation",
                format!("unknown document type `{}` (expected invoice or po)", args.doc_type),
                2,
            );
        }
    };
    let approval_type = match ApprovalType::parse(&args.approval) {
        Some(approval_type) => approval_type,
        None => {
            return CommandResult::failure(
                "intake",
                "argument_validation",
                format!(
                    "unknown approval mode `{}` (expected hierarchy, department, or single)",
                    args.approval
                ),
                2,
            );
        }
    };
    let total = match args.total.parse::<Decimal>() {
        Ok(total) => total,
        Err(_) => {
            return CommandResult::failure(
                "intake",
                "argument_validation",
                format!("`{}` is not a valid amount", args.total),
                2,
            );
        }
    };
    let gst_rate = match &args.gst_rate {
        Some(raw) => match raw.parse::<Decimal>() {
            Ok(rate) => rate,
            Err(_) => {
                return CommandResult::failure(
                    "intake",
                    "argument_validation",
                    format!("`{raw}` is not a valid GST rate"),
                    2,
                );
            }
        },
        None => ctx.config.intake.default_gst_rate,
    };
    let line_items = match parse_line_items(&args.lines) {
        Ok(items) => items,
        Err(message) => {
            return CommandResult::failure("intake", "argument_validation", message, 2);
        }
    };

    let (invoice_number, po_number) = match document_type {
        DocumentType::Invoice => (Some(args.number.clone()), None),
        DocumentType::PurchaseOrder => (None, Some(args.number.clone())),
    };

    let intake = DocumentIntake {
        document_type,
        invoice_number,
        po_number,
        vendor_info: args.vendor.clone(),
        total_amount: total,
        gst_rate,
        approval_type,
        line_items,
        document_url: args.document_url.clone(),
        attachments: Vec::new(),
        custom_fields: BTreeMap::new(),
        submitted_by: args.submitted_by.clone(),
    };

    let gateway = match commands::build_gateway(&ctx.config) {
        Ok(gateway) => gateway,
        Err(message) => return CommandResult::failure("intake", "config_validation", message, 2),
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

        let routing = SqlHierarchyRepository::new(pool.clone())
            .load_routing()
            .await
            .map_err(|error| ("persistence", error.to_string(), 1u8))?;

        let engine =
            WorkflowEngine::new(Arc::new(SqlDocumentRepository::new(pool.clone())), gateway);
        let outcome = engine.create_document(intake, &routing).await.map_err(|error| {
            (commands::workflow_error_class(&error), error.to_string(), 1u8)
        })?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(outcome)
    });

    match result {
        Ok(outcome) => CommandResult::success(
            "intake",
            format!(
                "document {} ({}) created at level {} awaiting {}; notification {}",
                outcome.document.id.0,
                outcome.document.external_ref(),
                outcome.document.current_approval_level,
                outcome.document.approver_email,
                if outcome.notified { "sent" } else { "not sent" }
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("intake", error_class, message, exit_code)
        }
    }
}

fn parse_line_items(raw_lines: &[String]) -> Result<Vec<LineItem>, String> {
    let mut items = Vec::with_capacity(raw_lines.len());
    for raw in raw_lines {
        let parts: Vec<&str> = raw.split('|').collect();
        let &[description, quantity, unit_price] = parts.as_slice() else {
            return Err(format!(
                "`{raw}` is not a valid line item (expected description|quantity|unit_price)"
            ));
        };
        let quantity = quantity
            .trim()
            .parse::<Decimal>()
            .map_err(|_| format!("`{quantity}` is not a valid quantity"))?;
        let unit_price = unit_price
            .trim()
            .parse::<Decimal>()
            .map_err(|_| format!("`{unit_price}` is not a valid unit price"))?;
        items.push(LineItem {
            description: description.trim().to_string(),
            quantity,
            unit_price,
            total: quantity * unit_price,
        });
    }
    Ok(items)
}
