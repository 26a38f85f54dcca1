use crate::commands::{Command, Confirmation};
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
use tracing::{error, info, instrument};

lazy_static! {
    static ref SR_APPROVALS: IntCounter = IntCounter::new(
        "service_request_approvals_total",
        "Total number of service request approvals"
    )
    .expect("metric can be created");
    static ref SR_APPROVAL_FAILURES: IntCounter = IntCounter::new(
        "service_request_approval_failures_total",
        "Total number of failed service request approvals"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone)]
pub struct ApproveServiceRequestCommand {
    pub sr_name: String,
}

impl ApproveServiceRequestCommand {
    pub fn new(sr_name: impl Into<String>) -> Self {
        Self {
            sr_name: sr_name.into(),
        }
    }
}

#[async_trait]
impl Command for ApproveServiceRequestCommand {
    type Result = ServiceRequest;

    fn dialog_heading(&self) -> String {
        format!("Approve {}?", self.sr_name)
    }

    #[instrument(skip(self, store, event_sender, _confirmation), fields(sr = %self.sr_name))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        let sr: ServiceRequest = store.fetch(&self.sr_name).await?;
        sr.workflow_state
            .ensure_transition(SrWorkflowState::Approved)
            .map_err(|e| {
                SR_APPROVAL_FAILURES.inc();
                e
            })?;

        let updated = store
            .update(
                doctypes::SERVICE_REQUESTS,
                &self.sr_name,
                json!({ "workflow_state": SrWorkflowState::Approved }),
            )
            .await
            .map_err(|e| {
                SR_APPROVAL_FAILURES.inc();
                error!(error = %e, "Failed to approve service request");
                e
            })?;
        let updated: ServiceRequest = serde_json::from_value(updated)?;

        event_sender
            .send(Event::ServiceRequestApproved(self.sr_name.clone()))
            .await
            .map_err(ServiceError::EventError)?;

        SR_APPROVALS.inc();
        info!(sr = %self.sr_name, "Service request approved");
        Ok(updated)
    }
}
