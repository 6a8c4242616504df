use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use apflow_core::{ApprovalRequestNotice, NotificationError, NotificationGateway};

use crate::message::approval_request_email;
use crate::transport::MailTransport;

/// Sends approval-request emails through a [`MailTransport`].
pub struct EmailNotificationGateway {
    transport: Arc<dyn MailTransport>,
    from_address: String,
    public_base_url: String,
}

impl EmailNotificationGateway {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        from_address: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            from_address: from_address.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl NotificationGateway for EmailNotificationGateway {
    async fn approval_requested(
        &self,
        notice: &ApprovalRequestNotice,
    ) -> Result<(), NotificationError> {
        let email = approval_request_email(notice, &self.from_address, &self.public_base_url);

        self.transport
            .deliver(&email)
            .await
            .map_err(|error| NotificationError(error.to_string()))?;

        info!(
            event_name = "notification_sent",
            document_id = %notice.document_id.0,
            approver = %notice.approver.email,
            level = notice.level,
            "approval request email delivered"
        );
        Ok(())
    }
}
