use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    commands::{Command, Confirmation},
    errors::ServiceError,
    events::{Event, EventSender},
    models::ProcurementOrder,
    store::{doctypes, DocumentStore, DocumentStoreExt},
    workflow::PoDetailAction,
};

lazy_static! {
    static ref PO_DELETIONS: IntCounter = IntCounter::new(
        "purchase_order_deletions_total",
        "Total number of purchase orders deleted"
    )
    .expect("metric can be created");
}

/// Hard removal of a PO that has no request to send value back to.
#[derive(Debug, Clone)]
pub struct DeletePurchaseOrderCommand {
    pub po_name: String,
}

impl DeletePurchaseOrderCommand {
    pub fn new(po_name: impl Into<String>) -> Self {
        Self {
            po_name: po_name.into(),
        }
    }
}

#[async_trait]
impl Command for DeletePurchaseOrderCommand {
    type Result = ();

    fn dialog_heading(&self) -> String {
        format!("Delete {}?", self.po_name)
    }

    #[instrument(skip(self, store, event_sender, _confirmation), fields(po = %self.po_name))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        let po: ProcurementOrder = store.fetch(&self.po_name).await?;
        if PoDetailAction::require(&po)? != PoDetailAction::Delete {
            return Err(ServiceError::InvalidOperation(format!(
                "{} offers Cancel, not Delete",
                po.name
            )));
        }

        store.delete(doctypes::PROCUREMENT_ORDERS, &self.po_name).await?;

        event_sender
            .send(Event::PurchaseOrderDeleted(self.po_name.clone()))
            .await
            .map_err(ServiceError::EventError)?;

        PO_DELETIONS.inc();
        info!(po = %self.po_name, "Purchase order deleted");
        Ok(())
    }
}
