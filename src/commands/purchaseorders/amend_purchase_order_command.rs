use crate::{
    commands::{
        extract_sent_back_id, methods, validate_comment, Command, Confirmation, ConfirmationDialog,
        SentBackId,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{PoItem, ProcurementOrder},
    store::{DocumentStore, DocumentStoreExt},
    workflow::{PoStatus, WorkflowStatus},
};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

lazy_static! {
    static ref PO_AMENDMENTS: IntCounter = IntCounter::new(
        "purchase_order_amendments_total",
        "Total number of purchase orders amended"
    )
    .expect("metric can be created");
    static ref PO_AMENDMENT_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "purchase_order_amendment_failures_total",
            "Total number of failed purchase order amendments"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
}

/// Local edits to an approved PO before they are submitted.
#[derive(Debug, Clone)]
pub struct AmendSession {
    po: ProcurementOrder,
    lines: Vec<PoItem>,
    removed: Vec<PoItem>,
}

impl AmendSession {
    /// Starts amending; only approved POs can be amended.
    pub fn start(po: ProcurementOrder) -> Result<Self, ServiceError> {
        po.status.ensure_transition(PoStatus::PoAmendment)?;
        if po.order_list.is_empty() {
            return Err(ServiceError::PreconditionFailed(format!(
                "{} has no line items to amend",
                po.name
            )));
        }
        Ok(Self {
            lines: po.order_list.list.clone(),
            removed: Vec::new(),
            po,
        })
    }

    pub fn po(&self) -> &ProcurementOrder {
        &self.po
    }

    pub fn lines(&self) -> &[PoItem] {
        &self.lines
    }

    /// Lines deleted outright.
    pub fn removed(&self) -> &[PoItem] {
        &self.removed
    }

    /// Value leaving the PO: every deleted line in full, plus the shortfall of
    /// each line whose quantity was lowered.
    pub fn sent_back_items(&self) -> Vec<PoItem> {
        let reductions = self.lines.iter().filter_map(|line| {
            let original = self.po.item(&line.name)?;
            (line.quantity < original.quantity).then(|| PoItem {
                quantity: original.quantity - line.quantity,
                ..original.clone()
            })
        });
        self.removed.iter().cloned().chain(reductions).collect()
    }

    /// Quantity currently shown for a line.
    pub fn quantity(&self, item_id: &str) -> Option<Decimal> {
        self.line(item_id).map(|line| line.quantity)
    }

    /// Whether the delete control is enabled: the PO must keep one line.
    pub fn can_delete(&self) -> bool {
        self.lines.len() > 1
    }

    pub fn is_dirty(&self) -> bool {
        !self.removed.is_empty()
            || self
                .lines
                .iter()
                .any(|line| self.po.item(&line.name).map(|orig| orig.quantity) != Some(line.quantity))
    }

    pub fn set_quantity(&mut self, item_id: &str, quantity: Decimal) -> Result<(), ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        let line = self
            .lines
            .iter_mut()
            .find(|line| line.name == item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {} not in PO", item_id)))?;
        line.quantity = quantity;
        Ok(())
    }

    pub fn delete_line(&mut self, item_id: &str) -> Result<(), ServiceError> {
        let index = self
            .lines
            .iter()
            .position(|line| line.name == item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {} not in PO", item_id)))?;
        if !self.can_delete() {
            return Err(ServiceError::InvalidOperation(
                "The last item of a PO cannot be deleted".to_string(),
            ));
        }
        let line = self.lines.remove(index);
        if let Some(original) = self.po.item(&line.name) {
            self.removed.push(original.clone());
        }
        Ok(())
    }

    /// Opens the top-level confirm dialog. Requires edits and a comment.
    pub fn submit(
        self,
        comment: impl Into<String>,
    ) -> Result<ConfirmationDialog<AmendPurchaseOrderCommand>, ServiceError> {
        if !self.is_dirty() {
            return Err(ServiceError::InvalidOperation(format!(
                "No changes to submit for {}",
                self.po.name
            )));
        }
        let removed_items = self.sent_back_items();
        let command = AmendPurchaseOrderCommand {
            po_name: self.po.name,
            order_list: self.lines,
            removed_items,
            comment: comment.into(),
        };
        command.validate()?;
        Ok(ConfirmationDialog::open(command))
    }

    fn line(&self, item_id: &str) -> Option<&PoItem> {
        self.lines.iter().find(|line| line.name == item_id)
    }
}

#[derive(Debug, Clone, Validate)]
pub struct AmendPurchaseOrderCommand {
    pub po_name: String,
    pub order_list: Vec<PoItem>,
    /// Deleted lines and quantity reductions; their value is sent back
    pub removed_items: Vec<PoItem>,
    #[validate(custom = "validate_comment")]
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct AmendPurchaseOrderResult {
    pub po: ProcurementOrder,
    pub sent_back: Option<SentBackId>,
}

#[async_trait::async_trait]
impl Command for AmendPurchaseOrderCommand {
    type Result = AmendPurchaseOrderResult;

    fn dialog_heading(&self) -> String {
        "Confirm PO Amendment?".to_string()
    }

    #[instrument(skip(self, store, event_sender, _confirmation), fields(po = %self.po_name))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        self.validate().map_err(|e| {
            PO_AMENDMENT_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            ServiceError::from(e)
        })?;

        let current: ProcurementOrder = store.fetch(&self.po_name).await?;
        current
            .status
            .ensure_transition(PoStatus::PoAmendment)
            .map_err(|e| {
                PO_AMENDMENT_FAILURES
                    .with_label_values(&["invalid_status"])
                    .inc();
                e
            })?;

        let response = store
            .call(
                methods::AMEND_PO,
                json!({
                    "po_name": self.po_name,
                    "order_list": { "list": self.order_list },
                    "removed_items": self.removed_items,
                    "comment": self.comment,
                }),
            )
            .await
            .map_err(|e| {
                PO_AMENDMENT_FAILURES.with_label_values(&["api_error"]).inc();
                error!(error = %e, "Failed to amend purchase order");
                e
            })?;

        let sent_back = if self.removed_items.is_empty() {
            None
        } else {
            Some(extract_sent_back_id(&response).map_err(|e| {
                PO_AMENDMENT_FAILURES
                    .with_label_values(&["extraction_error"])
                    .inc();
                e
            })?)
        };

        let po: ProcurementOrder = store.fetch(&self.po_name).await?;

        event_sender
            .send(Event::PurchaseOrderAmended {
                po: self.po_name.clone(),
                sent_back: sent_back.as_ref().map(|sb| sb.name.clone()),
            })
            .await
            .map_err(|e| {
                PO_AMENDMENT_FAILURES
                    .with_label_values(&["event_error"])
                    .inc();
                ServiceError::EventError(e)
            })?;

        PO_AMENDMENTS.inc();
        info!(
            po = %self.po_name,
            removed = self.removed_items.len(),
            sent_back = ?sent_back.as_ref().map(|sb| &sb.name),
            "Purchase order amended"
        );

        Ok(AmendPurchaseOrderResult { po, sent_back })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn po(lines: usize) -> ProcurementOrder {
        let list: Vec<_> = (1..=lines)
            .map(|i| json!({"name": format!("I{}", i), "item": "Cement", "quantity": 10, "quote": 400, "tax": 28, "category": "Civil"}))
            .collect();
        serde_json::from_value(json!({
            "name": "PO/2024/00001",
            "project": "PROJ-1",
            "vendor": "V-1",
            "procurement_request": "PR-000001",
            "status": "PO Approved",
            "order_list": {"list": list}
        }))
        .unwrap()
    }

    #[test]
    fn last_line_cannot_be_deleted() {
        let mut session = AmendSession::start(po(2)).unwrap();
        assert!(session.can_delete());
        session.delete_line("I1").unwrap();
        assert!(!session.can_delete());
        assert!(matches!(
            session.delete_line("I2"),
            Err(ServiceError::InvalidOperation(_))
        ));
        assert_eq!(session.lines().len(), 1);
        assert_eq!(session.removed()[0].name, "I1");
    }

    #[test]
    fn quantity_edit_is_reflected() {
        let mut session = AmendSession::start(po(1)).unwrap();
        assert!(!session.is_dirty());
        session.set_quantity("I1", dec!(4)).unwrap();
        assert_eq!(session.quantity("I1"), Some(dec!(4)));
        assert!(session.is_dirty());
        assert!(session.set_quantity("I1", dec!(0)).is_err());
    }

    #[test]
    fn lowered_quantity_is_sent_back() {
        let mut session = AmendSession::start(po(3)).unwrap();
        session.set_quantity("I1", dec!(6)).unwrap();
        session.set_quantity("I2", dec!(12)).unwrap();
        session.delete_line("I3").unwrap();

        let sent_back = session.sent_back_items();
        assert_eq!(sent_back.len(), 2);
        assert_eq!(sent_back[0].name, "I3");
        assert_eq!(sent_back[0].quantity, dec!(10));
        assert_eq!(sent_back[1].name, "I1");
        assert_eq!(sent_back[1].quantity, dec!(4));
        assert_eq!(sent_back[1].quote, dec!(400));
    }

    #[test]
    fn submit_requires_comment_and_changes() {
        let session = AmendSession::start(po(1)).unwrap();
        assert!(matches!(
            session.clone().submit("no-op"),
            Err(ServiceError::InvalidOperation(_))
        ));

        let mut session = session;
        session.set_quantity("I1", dec!(8)).unwrap();
        assert!(matches!(
            session.clone().submit("   "),
            Err(ServiceError::ValidationError(_))
        ));
        let dialog = session.submit("Vendor short on stock").unwrap();
        assert_eq!(dialog.heading(), "Confirm PO Amendment?");
    }

    #[test]
    fn only_approved_pos_can_be_amended() {
        let mut order = po(1);
        order.status = PoStatus::Dispatched;
        assert!(matches!(
            AmendSession::start(order),
            Err(ServiceError::InvalidStatus(_))
        ));
    }
}
