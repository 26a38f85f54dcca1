use crate::commands::{validate_comment, Command, Confirmation};
use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::ServiceRequest,
    store::{doctypes, DocumentStore, DocumentStoreExt},
    workflow::{SrWorkflowState, WorkflowStatus},
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

lazy_static! {
    static ref SR_REJECTIONS: IntCounter = IntCounter::new(
        "service_request_rejections_total",
        "Total number of service request rejections"
    )
    .expect("metric can be created");
    static ref SR_REJECTION_FAILURES: IntCounter = IntCounter::new(
        "service_request_rejection_failures_total",
        "Total number of failed service request rejections"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Validate)]
pub struct RejectServiceRequestCommand {
    pub sr_name: String,
    #[validate(custom = "validate_comment")]
    pub comment: String,
}

impl RejectServiceRequestCommand {
    pub fn new(sr_name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            sr_name: sr_name.into(),
            comment: comment.into(),
        }
    }
}

#[async_trait]
impl Command for RejectServiceRequestCommand {
    type Result = ServiceRequest;

    fn dialog_heading(&self) -> String {
        format!("Reject {}?", self.sr_name)
    }

    #[instrument(skip(self, store, event_sender, _confirmation), fields(sr = %self.sr_name))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        self.validate().map_err(|e| {
            SR_REJECTION_FAILURES.inc();
            ServiceError::from(e)
        })?;

        let sr: ServiceRequest = store.fetch(&self.sr_name).await?;
        sr.workflow_state
            .ensure_transition(SrWorkflowState::Rejected)
            .map_err(|e| {
                SR_REJECTION_FAILURES.inc();
                e
            })?;

        // The comment goes first so a rejected request never lacks its reason.
        let comment = store
            .create(
                doctypes::COMMENTS,
                json!({
                    "comment_type": "Comment",
                    "reference_doctype": doctypes::SERVICE_REQUESTS,
                    "reference_name": self.sr_name,
                    "subject": "rejecting sr",
                    "content": self.comment.trim(),
                }),
            )
            .await
            .map_err(|e| {
                SR_REJECTION_FAILURES.inc();
                error!(error = %e, "Failed to record rejection comment");
                e
            })?;

        let updated = match store
            .update(
                doctypes::SERVICE_REQUESTS,
                &self.sr_name,
                json!({ "workflow_state": SrWorkflowState::Rejected }),
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                SR_REJECTION_FAILURES.inc();
                error!(error = %e, "Failed to reject service request");
                if let Some(name) = comment.get("name").and_then(|n| n.as_str()) {
                    if let Err(cleanup) = store.delete(doctypes::COMMENTS, name).await {
                        warn!(error = %cleanup, comment = %name, "Failed to remove orphaned rejection comment");
                    }
                }
                return Err(e);
            }
        };
        let updated: ServiceRequest = serde_json::from_value(updated)?;

        event_sender
            .send(Event::ServiceRequestRejected {
                sr: self.sr_name.clone(),
                comment: self.comment.trim().to_string(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        SR_REJECTIONS.inc();
        info!(sr = %self.sr_name, "Service request rejected");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ConfirmationDialog;
    use crate::store::MockDocumentStore;
    use serde_json::Value;

    fn sr(state: &str) -> Value {
        json!({
            "name": "SR-000001",
            "project": "PROJ-1",
            "workflow_state": state,
            "service_order_list": {"list": []}
        })
    }

    fn reject() -> ConfirmationDialog<RejectServiceRequestCommand> {
        ConfirmationDialog::open(RejectServiceRequestCommand::new("SR-000001", "Rates too high"))
    }

    #[test]
    fn comment_is_required() {
        let err = RejectServiceRequestCommand::new("SR-0001", " ").validate().unwrap_err();
        assert_eq!(
            ServiceError::from(err).to_string(),
            "Validation error: comment: Comment is required"
        );
        assert!(RejectServiceRequestCommand::new("SR-0001", "Rates too high")
            .validate()
            .is_ok());
    }

    #[tokio::test]
    async fn failed_comment_leaves_request_untouched() {
        let mut store = MockDocumentStore::new();
        store.expect_get().returning(|_, _| Ok(sr("Vendor Selected")));
        store
            .expect_create()
            .withf(|doctype, doc| doctype == doctypes::COMMENTS && doc["content"] == "Rates too high")
            .times(1)
            .returning(|_, _| Err(ServiceError::ExternalApiError("comment insert failed".into())));
        store.expect_update().never();

        let (sender, mut rx) = EventSender::channel(4);
        let result = reject()
            .confirm_and_execute(Arc::new(store), Arc::new(sender))
            .await;

        assert!(matches!(result, Err(ServiceError::ExternalApiError(_))));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_state_change_removes_the_comment() {
        let mut store = MockDocumentStore::new();
        store.expect_get().returning(|_, _| Ok(sr("Vendor Selected")));
        store
            .expect_create()
            .times(1)
            .returning(|_, doc| Ok(json!({"name": "CMT-0007", "content": doc["content"]})));
        store
            .expect_update()
            .times(1)
            .returning(|_, _, _| Err(ServiceError::ExternalApiError("workflow locked".into())));
        store
            .expect_delete()
            .withf(|doctype, name| doctype == doctypes::COMMENTS && name == "CMT-0007")
            .times(1)
            .returning(|_, _| Ok(()));

        let (sender, mut rx) = EventSender::channel(4);
        let result = reject()
            .confirm_and_execute(Arc::new(store), Arc::new(sender))
            .await;

        assert!(matches!(result, Err(ServiceError::ExternalApiError(_))));
        assert!(rx.try_recv().is_err());
    }
}
