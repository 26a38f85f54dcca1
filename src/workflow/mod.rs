//! Workflow status model for procurement requests, purchase orders, sent-back
//! categories and service requests.
//!
//! The server owns every transition; these tables mirror the legal moves so a
//! request for an illegal one is refused before it is sent.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::errors::ServiceError;
use crate::models::{ProcurementOrder, ProcurementRequest, SbType};
use crate::store::{doctypes, Filter, ListQuery, SortOrder};

/// Shared behavior of the status enums.
pub trait WorkflowStatus: Copy + PartialEq + std::fmt::Display + 'static {
    fn allowed_next(&self) -> &'static [Self];

    fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    fn can_transition(&self, to: Self) -> bool {
        *self == to || self.allowed_next().contains(&to)
    }

    /// Errors with `InvalidStatus` when `to` is not reachable from `self`.
    fn ensure_transition(&self, to: Self) -> Result<(), ServiceError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(ServiceError::InvalidStatus(format!(
                "Cannot transition from '{}' to '{}'",
                self, to
            )))
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum PrWorkflowState {
    #[serde(rename = "Pending")]
    #[strum(serialize = "Pending")]
    Pending,
    #[serde(rename = "Vendor Selected")]
    #[strum(serialize = "Vendor Selected")]
    VendorSelected,
    #[serde(rename = "Partially Approved")]
    #[strum(serialize = "Partially Approved")]
    PartiallyApproved,
    #[serde(rename = "Approved")]
    #[strum(serialize = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    #[strum(serialize = "Rejected")]
    Rejected,
    #[serde(rename = "Delayed")]
    #[strum(serialize = "Delayed")]
    Delayed,
    #[serde(rename = "Cancelled")]
    #[strum(serialize = "Cancelled")]
    Cancelled,
}

impl WorkflowStatus for PrWorkflowState {
    fn allowed_next(&self) -> &'static [Self] {
        use PrWorkflowState::*;
        match self {
            Pending => &[VendorSelected, PartiallyApproved, Rejected, Delayed, Cancelled],
            VendorSelected => &[PartiallyApproved, Approved, Rejected, Delayed, Cancelled],
            PartiallyApproved => &[VendorSelected, Approved, Rejected, Delayed, Cancelled],
            Delayed => &[Pending, VendorSelected, Rejected, Cancelled],
            Approved | Rejected | Cancelled => &[],
        }
    }
}

/// Status of a single procurement line item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum ItemStatus {
    /// New item requested, not yet in the catalogue; excluded from totals
    #[serde(rename = "Request")]
    #[strum(serialize = "Request")]
    Request,
    #[serde(rename = "Pending")]
    #[strum(serialize = "Pending")]
    Pending,
    #[serde(rename = "Approved")]
    #[strum(serialize = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    #[strum(serialize = "Rejected")]
    Rejected,
    #[serde(rename = "Delayed")]
    #[strum(serialize = "Delayed")]
    Delayed,
    #[serde(rename = "Sent Back")]
    #[strum(serialize = "Sent Back")]
    SentBack,
    /// Any status this crate does not act on
    #[serde(other)]
    #[strum(serialize = "Other")]
    Other,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum PoStatus {
    #[serde(rename = "PO Approved")]
    #[strum(serialize = "PO Approved")]
    PoApproved,
    #[serde(rename = "PO Amendment")]
    #[strum(serialize = "PO Amendment")]
    PoAmendment,
    #[serde(rename = "Dispatched")]
    #[strum(serialize = "Dispatched")]
    Dispatched,
    #[serde(rename = "Delivered")]
    #[strum(serialize = "Delivered")]
    Delivered,
    #[serde(rename = "Merged")]
    #[strum(serialize = "Merged")]
    Merged,
    #[serde(rename = "Cancelled")]
    #[strum(serialize = "Cancelled")]
    Cancelled,
}

impl WorkflowStatus for PoStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use PoStatus::*;
        match self {
            PoApproved => &[Dispatched, PoAmendment, Merged, Cancelled],
            PoAmendment => &[PoApproved],
            Dispatched => &[Delivered],
            Delivered | Merged | Cancelled => &[],
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum SbWorkflowState {
    #[serde(rename = "Pending")]
    #[strum(serialize = "Pending")]
    Pending,
    #[serde(rename = "Vendor Selected")]
    #[strum(serialize = "Vendor Selected")]
    VendorSelected,
    #[serde(rename = "Partially Approved")]
    #[strum(serialize = "Partially Approved")]
    PartiallyApproved,
    #[serde(rename = "Approved")]
    #[strum(serialize = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    #[strum(serialize = "Rejected")]
    Rejected,
    #[serde(rename = "Delayed")]
    #[strum(serialize = "Delayed")]
    Delayed,
    #[serde(rename = "Cancelled")]
    #[strum(serialize = "Cancelled")]
    Cancelled,
}

impl WorkflowStatus for SbWorkflowState {
    fn allowed_next(&self) -> &'static [Self] {
        use SbWorkflowState::*;
        match self {
            Pending => &[VendorSelected, PartiallyApproved, Rejected, Delayed, Cancelled],
            VendorSelected | PartiallyApproved => &[Approved, Rejected, Delayed, Cancelled],
            Approved | Rejected | Delayed | Cancelled => &[],
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum SrWorkflowState {
    #[serde(rename = "Pending")]
    #[strum(serialize = "Pending")]
    Pending,
    #[serde(rename = "Vendor Selected")]
    #[strum(serialize = "Vendor Selected")]
    VendorSelected,
    #[serde(rename = "Approved")]
    #[strum(serialize = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    #[strum(serialize = "Rejected")]
    Rejected,
    #[serde(rename = "Cancelled")]
    #[strum(serialize = "Cancelled")]
    Cancelled,
}

impl WorkflowStatus for SrWorkflowState {
    fn allowed_next(&self) -> &'static [Self] {
        use SrWorkflowState::*;
        match self {
            Pending => &[VendorSelected, Cancelled],
            VendorSelected => &[Approved, Rejected, Cancelled],
            // A rejected request goes back to vendor selection after rework.
            Rejected => &[VendorSelected, Cancelled],
            Approved | Cancelled => &[],
        }
    }
}

/// Views that list procurement requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PrView {
    /// Requests still waiting for vendor quotes
    #[strum(serialize = "Select Vendor")]
    SelectVendor,
    /// Requests with quoted items awaiting PO approval
    #[strum(serialize = "Approve PO")]
    ApprovePo,
}

impl PrView {
    pub fn includes(&self, pr: &ProcurementRequest) -> bool {
        let items = &pr.procurement_list.list;
        match self {
            PrView::SelectVendor => {
                pr.workflow_state == PrWorkflowState::Pending
                    && items
                        .iter()
                        .any(|item| item.status == ItemStatus::Pending && item.quote.is_none())
            }
            PrView::ApprovePo => {
                matches!(
                    pr.workflow_state,
                    PrWorkflowState::VendorSelected | PrWorkflowState::PartiallyApproved
                ) && items
                    .iter()
                    .any(|item| item.status == ItemStatus::Pending && item.quote.is_some())
            }
        }
    }
}

/// Purchase-order tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PoView {
    #[strum(serialize = "Approved PO")]
    Approved,
    /// Sent-back records for rejected and cancelled POs
    #[strum(serialize = "Rejected PO")]
    Rejected,
}

impl PoView {
    pub fn doctype(&self) -> &'static str {
        match self {
            PoView::Approved => doctypes::PROCUREMENT_ORDERS,
            PoView::Rejected => doctypes::SENT_BACK_CATEGORY,
        }
    }

    pub fn query(&self) -> ListQuery {
        let query = ListQuery::new().order_by("creation", SortOrder::Desc);
        match self {
            PoView::Approved => query.filter(Filter::eq("status", PoStatus::PoApproved.to_string())),
            PoView::Rejected => query.filter(Filter::is_in(
                "type",
                [SbType::Rejected.to_string(), SbType::Cancelled.to_string()],
            )),
        }
    }

    /// Text of the clickable id cell for a row: the full PO name, or the
    /// trailing sequence of a sent-back record name.
    pub fn cell_id(&self, row: &serde_json::Value) -> Option<String> {
        let name = row.get("name")?.as_str()?;
        match self {
            PoView::Approved => Some(name.to_string()),
            PoView::Rejected => name.rsplit('-').next().map(str::to_string),
        }
    }
}

/// The one destructive control a PO detail page offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PoDetailAction {
    /// Cancel and carry the remaining value into a sent-back record
    Cancel,
    /// Hard removal, no sent-back record
    Delete,
}

impl PoDetailAction {
    /// Exactly one of Cancel/Delete for an approved PO; `None` otherwise.
    ///
    /// Custom POs have no procurement request to send value back to, so they
    /// are deleted instead of cancelled.
    pub fn for_order(po: &ProcurementOrder) -> Option<Self> {
        if po.status != PoStatus::PoApproved {
            return None;
        }
        if po.is_custom() || po.procurement_request.is_none() {
            Some(PoDetailAction::Delete)
        } else {
            Some(PoDetailAction::Cancel)
        }
    }

    /// Like [`for_order`](Self::for_order) but a missing control is fatal.
    pub fn require(po: &ProcurementOrder) -> Result<Self, ServiceError> {
        Self::for_order(po).ok_or_else(|| {
            ServiceError::PreconditionFailed(format!(
                "Neither Cancel nor Delete is available for {} in status '{}'",
                po.name, po.status
            ))
        })
    }
}
