use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    commands::{await_listed, extract_sent_back_id, methods, Command, Confirmation, SentBackId},
    config::FlowTimeouts,
    errors::ServiceError,
    events::{Event, EventSender},
    models::ProcurementOrder,
    store::{DocumentStore, DocumentStoreExt},
    workflow::{PoDetailAction, PoStatus, PoView, WorkflowStatus},
};

lazy_static! {
    static ref PO_CANCELLATIONS: IntCounter = IntCounter::new(
        "purchase_order_cancellations_total",
        "Total number of purchase orders cancelled"
    )
    .expect("metric can be created");
    static ref PO_CANCELLATION_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "purchase_order_cancellation_failures_total",
            "Total number of failed purchase order cancellations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
}

/// Cancels an approved PO; the server carries its value into a new sent-back record.
#[derive(Debug, Clone)]
pub struct CancelPurchaseOrderCommand {
    pub po_name: String,
    pub comment: Option<String>,
}

impl CancelPurchaseOrderCommand {
    pub fn new(po_name: impl Into<String>) -> Self {
        Self {
            po_name: po_name.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CancelPurchaseOrderResult {
    pub po_name: String,
    pub sent_back: SentBackId,
}

impl CancelPurchaseOrderResult {
    /// Waits until the sent-back suffix shows up in the Rejected PO list.
    #[instrument(skip(self, store, timeouts), fields(sent_back = %self.sent_back.name))]
    pub async fn await_rejected_listing(
        &self,
        store: &dyn DocumentStore,
        timeouts: &FlowTimeouts,
    ) -> Result<Value, ServiceError> {
        let view = PoView::Rejected;
        let suffix = self.sent_back.suffix.as_str();
        await_listed(store, view.doctype(), &view.query(), timeouts, |row| {
            view.cell_id(row).as_deref() == Some(suffix)
        })
        .await
    }
}

#[async_trait]
impl Command for CancelPurchaseOrderCommand {
    type Result = CancelPurchaseOrderResult;

    fn dialog_heading(&self) -> String {
        format!("Cancel {}?", self.po_name)
    }

    #[instrument(skip(self, store, event_sender, _confirmation), fields(po = %self.po_name))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        let po: ProcurementOrder = store.fetch(&self.po_name).await?;
        if PoDetailAction::require(&po)? != PoDetailAction::Cancel {
            PO_CANCELLATION_FAILURES
                .with_label_values(&["precondition"])
                .inc();
            return Err(ServiceError::InvalidOperation(format!(
                "{} offers Delete, not Cancel",
                po.name
            )));
        }
        po.status.ensure_transition(PoStatus::Cancelled)?;

        let response = store
            .call(
                methods::CANCEL_PO,
                json!({ "po_name": self.po_name, "comment": self.comment }),
            )
            .await
            .map_err(|e| {
                PO_CANCELLATION_FAILURES
                    .with_label_values(&["api_error"])
                    .inc();
                error!(error = %e, "Failed to cancel purchase order");
                e
            })?;

        let sent_back = extract_sent_back_id(&response).map_err(|e| {
            PO_CANCELLATION_FAILURES
                .with_label_values(&["extraction_error"])
                .inc();
            e
        })?;

        event_sender
            .send(Event::PurchaseOrderCancelled {
                po: self.po_name.clone(),
                sent_back: sent_back.name.clone(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        PO_CANCELLATIONS.inc();
        info!(po = %self.po_name, sent_back = %sent_back.name, "Purchase order cancelled");

        Ok(CancelPurchaseOrderResult {
            po_name: self.po_name.clone(),
            sent_back,
        })
    }
}
