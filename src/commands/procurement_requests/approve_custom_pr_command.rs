use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strum::Display;
use tracing::{error, info, instrument};

use crate::{
    commands::{methods, Command, Confirmation, ConfirmationDialog},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{PrItem, ProcurementRequest},
    store::{message_field, DocumentStore, DocumentStoreExt},
    workflow::{PrWorkflowState, WorkflowStatus},
};

lazy_static! {
    static ref CUSTOM_PR_APPROVALS: IntCounter = IntCounter::new(
        "custom_pr_approvals_total",
        "Total number of custom procurement requests approved"
    )
    .expect("metric can be created");
    static ref CUSTOM_PR_APPROVAL_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "custom_pr_approval_failures_total",
            "Total number of failed custom procurement request approvals"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
}

/// `data-state` of a vendor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BlockState {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub struct VendorBlock {
    pub vendor: String,
    pub state: BlockState,
    pub lines: Vec<PrItem>,
    checked: BTreeSet<String>,
}

impl VendorBlock {
    pub fn is_checked(&self, item_id: &str) -> bool {
        self.checked.contains(item_id)
    }

    pub fn all_checked(&self) -> bool {
        self.lines.iter().all(|line| self.checked.contains(&line.name))
    }
}

/// Approval screen of a custom PR: one collapsible block per vendor, each
/// line checked by hand.
#[derive(Debug, Clone)]
pub struct CustomPrApproval {
    pr: ProcurementRequest,
    blocks: Vec<VendorBlock>,
}

impl CustomPrApproval {
    pub fn new(pr: ProcurementRequest) -> Result<Self, ServiceError> {
        let mut by_vendor: BTreeMap<String, Vec<PrItem>> = BTreeMap::new();
        for line in pr.progressed_items() {
            let vendor = line.vendor.clone().ok_or_else(|| {
                ServiceError::PreconditionFailed(format!(
                    "{} has no vendor on item {}",
                    pr.name, line.name
                ))
            })?;
            by_vendor.entry(vendor).or_default().push(line.clone());
        }
        if by_vendor.is_empty() {
            return Err(ServiceError::PreconditionFailed(format!(
                "{} has no items to approve",
                pr.name
            )));
        }
        let blocks = by_vendor
            .into_iter()
            .map(|(vendor, lines)| VendorBlock {
                vendor,
                state: BlockState::Closed,
                lines,
                checked: BTreeSet::new(),
            })
            .collect();
        Ok(Self { pr, blocks })
    }

    pub fn pr(&self) -> &ProcurementRequest {
        &self.pr
    }

    pub fn blocks(&self) -> &[VendorBlock] {
        &self.blocks
    }

    pub fn block(&self, vendor: &str) -> Option<&VendorBlock> {
        self.blocks.iter().find(|block| block.vendor == vendor)
    }

    pub fn expand(&mut self, vendor: &str) -> Result<(), ServiceError> {
        self.block_mut(vendor)?.state = BlockState::Open;
        Ok(())
    }

    /// Collapsing keeps the checks already made.
    pub fn collapse(&mut self, vendor: &str) -> Result<(), ServiceError> {
        self.block_mut(vendor)?.state = BlockState::Closed;
        Ok(())
    }

    pub fn check(&mut self, vendor: &str, item_id: &str) -> Result<(), ServiceError> {
        let block = self.open_block(vendor, item_id)?;
        block.checked.insert(item_id.to_string());
        Ok(())
    }

    pub fn uncheck(&mut self, vendor: &str, item_id: &str) -> Result<(), ServiceError> {
        let block = self.open_block(vendor, item_id)?;
        block.checked.remove(item_id);
        Ok(())
    }

    /// Approve is enabled only once every line of every vendor is checked.
    pub fn can_approve(&self) -> bool {
        self.blocks.iter().all(VendorBlock::all_checked)
    }

    pub fn approve(self) -> Result<ConfirmationDialog<ApproveCustomPrCommand>, ServiceError> {
        if !self.can_approve() {
            return Err(ServiceError::PreconditionFailed(
                "Every item must be checked before approval".to_string(),
            ));
        }
        Ok(ConfirmationDialog::open(ApproveCustomPrCommand {
            pr_name: self.pr.name,
            project: self.pr.project,
            vendors: self.blocks.iter().map(|b| b.vendor.clone()).collect(),
            items: self.blocks.into_iter().flat_map(|b| b.lines).collect(),
        }))
    }

    fn block_mut(&mut self, vendor: &str) -> Result<&mut VendorBlock, ServiceError> {
        let pr = &self.pr.name;
        self.blocks
            .iter_mut()
            .find(|block| block.vendor == vendor)
            .ok_or_else(|| ServiceError::NotFound(format!("vendor {} not in {}", vendor, pr)))
    }

    fn open_block(&mut self, vendor: &str, item_id: &str) -> Result<&mut VendorBlock, ServiceError> {
        let block = self.block_mut(vendor)?;
        if block.state == BlockState::Closed {
            return Err(ServiceError::PreconditionFailed(format!(
                "vendor block {} is closed",
                vendor
            )));
        }
        if !block.lines.iter().any(|line| line.name == item_id) {
            return Err(ServiceError::NotFound(format!(
                "item {} not quoted by {}",
                item_id, vendor
            )));
        }
        Ok(block)
    }
}

#[derive(Debug, Clone)]
pub struct ApproveCustomPrCommand {
    pub pr_name: String,
    pub project: String,
    pub vendors: Vec<String>,
    pub items: Vec<PrItem>,
}

#[derive(Debug, Clone)]
pub struct ApproveCustomPrResult {
    pub pr_name: String,
    /// POs raised by the server, when it reports them
    pub purchase_orders: Vec<String>,
}

#[async_trait]
impl Command for ApproveCustomPrCommand {
    type Result = ApproveCustomPrResult;

    fn dialog_heading(&self) -> String {
        "Confirm Approval?".to_string()
    }

    #[instrument(skip(self, store, event_sender, _confirmation), fields(pr = %self.pr_name))]
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        _confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError> {
        let pr: ProcurementRequest = store.fetch(&self.pr_name).await?;
        pr.workflow_state
            .ensure_transition(PrWorkflowState::Approved)
            .map_err(|e| {
                CUSTOM_PR_APPROVAL_FAILURES
                    .with_label_values(&["invalid_status"])
                    .inc();
                e
            })?;

        let response = store
            .call(
                methods::APPROVE_CUSTOM_PR,
                json!({
                    "project_id": self.project,
                    "pr_name": self.pr_name,
                    "selected_items": self.items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
                    "selected_vendors": self.vendors,
                }),
            )
            .await
            .map_err(|e| {
                CUSTOM_PR_APPROVAL_FAILURES
                    .with_label_values(&["api_error"])
                    .inc();
                error!(error = %e, "Failed to approve custom procurement request");
                e
            })?;

        let purchase_orders = message_field(&response, "po_names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        event_sender
            .send(Event::ProcurementRequestApproved {
                pr: self.pr_name.clone(),
                vendors: self.vendors.clone(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        CUSTOM_PR_APPROVALS.inc();
        info!(pr = %self.pr_name, vendors = self.vendors.len(), "Custom procurement request approved");

        Ok(ApproveCustomPrResult {
            pr_name: self.pr_name.clone(),
            purchase_orders,
        })
    }
}
