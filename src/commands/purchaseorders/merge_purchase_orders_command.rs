use async_trait::async_trait;
use futures::future::try_join_all;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    commands::{await_listed, methods, Command, Confirmation, ConfirmationDialog},
    config::FlowTimeouts,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{PoItem, ProcurementOrder},
    services::totals::{po_totals, PoTotals},
    store::{message_field, DocumentStore, DocumentStoreExt, Filter, ListQuery},
    workflow::{PoStatus, PoView, WorkflowStatus},
};

lazy_static! {
    static ref PO_MERGES: IntCounter = IntCounter::new(
        "purchase_order_merges_total",
        "Total number of purchase order merges"
    )
    .expect("metric can be created");
    static ref PO_MERGE_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "purchase_order_merge_failures_total",
            "Total number of failed purchase order merges"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
}

/// Sibling POs chosen for merging into a target PO.
#[derive(Debug, Clone)]
pub struct MergeSelection {
    target: ProcurementOrder,
    candidates: Vec<ProcurementOrder>,
    selected: BTreeSet<String>,
    timeouts: FlowTimeouts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergePreview {
    pub sources: Vec<String>,
    /// Every line of the target and the selected POs, tagged with its source
    pub lines: Vec<PoItem>,
    pub totals: PoTotals,
}

impl MergeSelection {
    /// Keeps only candidates that can merge with `target`: approved, not custom,
    /// same vendor and project.
    pub fn new(
        target: ProcurementOrder,
        candidates: Vec<ProcurementOrder>,
        timeouts: FlowTimeouts,
    ) -> Result<Self, ServiceError> {
        target.status.ensure_transition(PoStatus::Merged)?;
        let candidates = candidates
            .into_iter()
            .filter(|po| {
                po.name != target.name
                    && po.status == PoStatus::PoApproved
                    && !po.is_custom()
                    && po.vendor == target.vendor
                    && po.project == target.project
            })
            .collect();
        Ok(Self {
            target,
            candidates,
            selected: BTreeSet::new(),
            timeouts,
        })
    }

    #[instrument(skip(store, timeouts))]
    pub async fn load(
        store: &dyn DocumentStore,
        target_name: &str,
        timeouts: FlowTimeouts,
    ) -> Result<Self, ServiceError> {
        let target: ProcurementOrder = store.fetch(target_name).await?;
        let candidates = store
            .fetch_list(
                &ListQuery::new()
                    .filter(Filter::eq("project", target.project.as_str()))
                    .filter(Filter::eq("vendor", target.vendor.as_str()))
                    .filter(Filter::eq("status", PoStatus::PoApproved.to_string()))
                    .filter(Filter::not_in("name", [target.name.as_str()])),
            )
            .await?;
        Self::new(target, candidates, timeouts)
    }

    pub fn target(&self) -> &ProcurementOrder {
        &self.target
    }

    pub fn candidates(&self) -> &[ProcurementOrder] {
        &self.candidates
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Flips one candidate; returns whether it is now selected.
    pub fn toggle(&mut self, name: &str) -> Result<bool, ServiceError> {
        if !self.candidates.iter().any(|po| po.name == name) {
            return Err(ServiceError::NotFound(format!(
                "{} is not a merge candidate for {}",
                name, self.target.name
            )));
        }
        if self.selected.remove(name) {
            Ok(false)
        } else {
            self.selected.insert(name.to_string());
            Ok(true)
        }
    }

    pub fn preview(&self) -> MergePreview {
        let mut lines = Vec::new();
        for po in std::iter::once(&self.target).chain(
            self.candidates
                .iter()
                .filter(|po| self.selected.contains(&po.name)),
        ) {
            lines.extend(po.order_list.iter().cloned().map(|mut line| {
                line.po = Some(po.name.clone());
                line
            }));
        }
        MergePreview {
            sources: self.selected.iter().cloned().collect(),
            totals: po_totals(&lines),
            lines,
        }
    }

    /// First dialog: shows the preview and asks to proceed.
    pub fn open_dialog(self) -> Result<MergeDialog, ServiceError> {
        if self.selected.is_empty() {
            return Err(ServiceError::PreconditionFailed(
                "Select at least one PO to merge".to_string(),
            ));
        }
        Ok(MergeDialog { selection: self })
    }
}

/// First of the two merge dialogs.
#[derive(Debug)]
pub struct MergeDialog {
    selection: MergeSelection,
}

impl MergeDialog {
    pub fn preview(&self) -> MergePreview {
        self.selection.preview()
    }

    pub fn cancel(self) -> MergeSelection {
        self.selection
    }

    /// Opens the final confirmation dialog.
    pub fn proceed(self) -> ConfirmationDialog<MergePurchaseOrdersCommand> {
        let preview = self.selection.preview();
        ConfirmationDialog::open(MergePurchaseOrdersCommand {
            target: self.selection.target.name,
            sources: preview.sources,
            order_list: preview.lines,
            timeouts: self.selection.timeouts,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MergePurchaseOrdersCommand {
    pub target: String,
    pub sources: Vec<String>,
    pub order_list: Vec<PoItem>,
    pub timeouts: FlowTimeouts,
}

#[derive(Debug, Clone)]
pub struct MergePurchaseOrdersResult {
    pub new_po_name: String,
    pub merged: Vec<String>,
    /// The new PO's row as found in the Approved PO list
    pub listing: Value,
}

#[async_trait]
impl Command for MergePurchaseOrdersCommand {
    type Result = MergePurchaseOrdersResult;

    fn dialog_heading(&self) -> String {
        "Confirm Merge?".to_string()
    }

    /// Completes only once the new PO is listed among approved POs.
    #[instrument(skip(self, store, event_sender, _confirmation), fields(target = %self.target))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        let current: Vec<ProcurementOrder> = try_join_all(
            std::iter::once(&self.target)
                .chain(self.sources.iter())
                .map(|name| store.fetch::<ProcurementOrder>(name)),
        )
        .await?;
        for po in &current {
            po.status.ensure_transition(PoStatus::Merged).map_err(|e| {
                PO_MERGE_FAILURES.with_label_values(&["invalid_status"]).inc();
                e
            })?;
        }

        let response = store
            .call(
                methods::MERGE_POS,
                json!({
                    "po_id": self.target,
                    "merged_items": self.sources,
                    "order_data": { "list": self.order_list },
                }),
            )
            .await
            .map_err(|e| {
                PO_MERGE_FAILURES.with_label_values(&["api_error"]).inc();
                error!(error = %e, "Failed to merge purchase orders");
                e
            })?;

        let new_po_name = message_field(&response, "new_po_name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PO_MERGE_FAILURES
                    .with_label_values(&["extraction_error"])
                    .inc();
                ServiceError::ExtractionError(format!("no new_po_name in response: {}", response))
            })?;

        let view = PoView::Approved;
        let listing = await_listed(
            store.as_ref(),
            view.doctype(),
            &view.query(),
            &self.timeouts,
            |row| view.cell_id(row).as_deref() == Some(new_po_name.as_str()),
        )
        .await
        .map_err(|e| {
            PO_MERGE_FAILURES.with_label_values(&["not_listed"]).inc();
            e
        })?;

        let mut merged = vec![self.target.clone()];
        merged.extend(self.sources.iter().cloned());

        event_sender
            .send(Event::PurchaseOrdersMerged {
                sources: merged.clone(),
                new_po: new_po_name.clone(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        PO_MERGES.inc();
        info!(new_po = %new_po_name, merged = merged.len(), "Purchase orders merged");

        Ok(MergePurchaseOrdersResult {
            new_po_name,
            merged,
            listing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn po(name: &str, vendor: &str, status: &str) -> ProcurementOrder {
        serde_json::from_value(json!({
            "name": name,
            "project": "PROJ-1",
            "vendor": vendor,
            "procurement_request": "PR-1",
            "status": status,
            "order_list": {"list": [
                {"name": format!("{}-I", name), "quantity": 2, "quote": 100, "tax": 18, "category": "Civil"}
            ]}
        }))
        .unwrap()
    }

    fn selection() -> MergeSelection {
        MergeSelection::new(
            po("PO/1", "V1", "PO Approved"),
            vec![
                po("PO/1", "V1", "PO Approved"),
                po("PO/2", "V1", "PO Approved"),
                po("PO/3", "V1", "PO Approved"),
                po("PO/4", "V2", "PO Approved"),
                po("PO/5", "V1", "Dispatched"),
            ],
            FlowTimeouts::default(),
        )
        .unwrap()
    }

    #[test]
    fn candidates_share_vendor_and_project() {
        let names: Vec<_> = selection().candidates().iter().map(|po| po.name.clone()).collect();
        assert_eq!(names, vec!["PO/2", "PO/3"]);
    }

    #[test]
    fn candidates_toggle_individually() {
        let mut selection = selection();
        assert!(selection.toggle("PO/2").unwrap());
        assert!(!selection.is_selected("PO/3"));
        assert!(!selection.toggle("PO/2").unwrap());
        assert!(selection.toggle("PO/4").is_err());
    }

    #[test]
    fn preview_tags_lines_with_source() {
        let mut selection = selection();
        selection.toggle("PO/3").unwrap();
        let preview = selection.preview();
        assert_eq!(preview.sources, vec!["PO/3"]);
        assert_eq!(preview.lines.len(), 2);
        assert_eq!(preview.lines[1].po.as_deref(), Some("PO/3"));
        assert_eq!(preview.totals.excl_gst, dec!(400));
    }

    #[test]
    fn dialog_requires_a_selection_and_has_two_stages() {
        assert!(matches!(
            selection().open_dialog(),
            Err(ServiceError::PreconditionFailed(_))
        ));

        let mut selection = selection();
        selection.toggle("PO/2").unwrap();
        let first = selection.open_dialog().unwrap();
        let selection = first.cancel();
        assert!(selection.is_selected("PO/2"));

        let confirm = selection.open_dialog().unwrap().proceed();
        assert_eq!(confirm.heading(), "Confirm Merge?");
        assert_eq!(confirm.command().sources, vec!["PO/2"]);
    }
}
