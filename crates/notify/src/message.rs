use serde::{Deserialize, Serialize};

use apflow_core::ApprovalRequestNotice;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to: String,
    pub to_name: String,
    pub from: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

fn action_link(base_url: &str, document_id: &str, action: &str) -> String {
    format!("{}/api/documents/{}/action/{}", base_url.trim_end_matches('/'), document_id, action)
}

fn document_label(notice: &ApprovalRequestNotice) -> &'static str {
    match notice.document_type {
        apflow_core::DocumentType::Invoice => "Invoice",
        apflow_core::DocumentType::PurchaseOrder => "Purchase order",
    }
}

/// Assemble the approval-request email for `notice`.
///
/// The three action links hit the unauthenticated one-click endpoints, so
/// the recipient can act straight from their mail client.
pub fn approval_request_email(
    notice: &ApprovalRequestNotice,
    from: &str,
    public_base_url: &str,
) -> OutboundEmail {
    let label = document_label(notice);
    let subject = format!(
        "Approval required: {} {} ({})",
        label, notice.external_ref, notice.total_amount
    );

    let approve = action_link(public_base_url, &notice.document_id.0, "approve");
    let reject = action_link(public_base_url, &notice.document_id.0, "reject");
    let hold = action_link(public_base_url, &notice.document_id.0, "hold");

    let mut document_line = notice
        .document_url
        .as_deref()
        .map(|url| format!("Document: {url}\n"))
        .unwrap_or_default();
    for attachment in &notice.attachments {
        document_line.push_str(&format!("Attachment: {attachment}\n"));
    }

    let text_body = format!(
        "Hello {name},\n\n\
         {label} {reference} (total {total}) is waiting on your approval at level {level}.\n\
         {document_line}\n\
         Approve: {approve}\n\
         Reject:  {reject}\n\
         Hold:    {hold}\n",
        name = notice.approver.name,
        label = label,
        reference = notice.external_ref,
        total = notice.total_amount,
        level = notice.level,
        document_line = document_line,
        approve = approve,
        reject = reject,
        hold = hold,
    );

    let html_body = format!(
        "<p>Hello {name},</p>\
         <p>{label} <strong>{reference}</strong> (total {total}) is waiting on your approval at level {level}.</p>\
         <p>\
           <a href=\"{approve}\">Approve</a> &middot; \
           <a href=\"{reject}\">Reject</a> &middot; \
           <a href=\"{hold}\">Hold</a>\
         </p>",
        name = notice.approver.name,
        label = label,
        reference = notice.external_ref,
        total = notice.total_amount,
        level = notice.level,
        approve = approve,
        reject = reject,
        hold = hold,
    );

    OutboundEmail {
        to: notice.approver.email.clone(),
        to_name: notice.approver.name.clone(),
        from: from.to_string(),
        subject,
        text_body,
        html_body,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use apflow_core::hierarchy::Assignee;
    use apflow_core::{ApprovalRequestNotice, DocumentId, DocumentType};

    use super::approval_request_email;

    fn notice() -> ApprovalRequestNotice {
        ApprovalRequestNotice {
            document_id: DocumentId("doc-9".to_string()),
            external_ref: "INV-1009".to_string(),
            document_type: DocumentType::Invoice,
            total_amount: Decimal::new(118_000, 2),
            level: 2,
            approver: Assignee {
                name: "Bala".to_string(),
                email: "bala@example.test".to_string(),
            },
            document_url: None,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn email_carries_all_three_action_links() {
        let email =
            approval_request_email(&notice(), "approvals@example.test", "https://ap.example.test/");

        assert_eq!(email.to, "bala@example.test");
        assert_eq!(email.subject, "Approval required: Invoice INV-1009 (1180.00)");
        for action in ["approve", "reject", "hold"] {
            let link = format!("https://ap.example.test/api/documents/doc-9/action/{action}");
            assert!(email.text_body.contains(&link), "text body should link {action}");
            assert!(email.html_body.contains(&link), "html body should link {action}");
        }
    }

    #[test]
    fn purchase_orders_are_labelled_as_such() {
        let mut notice = notice();
        notice.document_type = DocumentType::PurchaseOrder;
        notice.external_ref = "PO-7001".to_string();

        let email =
            approval_request_email(&notice, "approvals@example.test", "http://localhost:3000");
        assert!(email.subject.starts_with("Approval required: Purchase order PO-7001"));
    }

    #[test]
    fn document_url_and_attachments_are_included_when_present() {
        let mut notice = notice();
        notice.document_url = Some("https://files.example.test/inv-1009.pdf".to_string());
        notice.attachments = vec!["https://files.example.test/inv-1009-scan.png".to_string()];

        let email =
            approval_request_email(&notice, "approvals@example.test", "http://localhost:3000");
        assert!(email.text_body.contains("https://files.example.test/inv-1009.pdf"));
        assert!(email.text_body.contains("https://files.example.test/inv-1009-scan.png"));
    }
}
