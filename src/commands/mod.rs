use crate::{
    config::FlowTimeouts,
    errors::ServiceError,
    events::EventSender,
    store::{message_field, DocumentStore, ListQuery},
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, warn};
use validator::ValidationError;

pub mod procurement_requests;
pub mod purchaseorders;
pub mod service_requests;

/// Command trait for implementing the Command Pattern
///
/// Every command here changes a document's workflow state, so execution
/// requires a [`Confirmation`], which only [`ConfirmationDialog::confirm`] can
/// produce.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    /// Heading of the confirmation dialog guarding this command.
    fn dialog_heading(&self) -> String {
        "Are you sure?".to_string()
    }

    /// Execute the command with the given dependencies
    ///
    /// # Arguments
    /// * `store` - Remote document store
    /// * `event_sender` - Channel to publish domain events
    /// * `confirmation` - Proof that the user confirmed the dialog
    async fn execute(
        &self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
        confirmation: Confirmation,
    ) -> Result<Self::Result, ServiceError>;
}

/// Proof of an explicit "Confirm" click. Not constructible outside this module
/// and consumed by the command it authorizes.
#[derive(Debug)]
pub struct Confirmation {
    _private: (),
}

/// A dialog opened by a primary trigger. Nothing happens until it is confirmed.
#[derive(Debug)]
pub struct ConfirmationDialog<C> {
    command: C,
    heading: String,
}

impl<C: Command> ConfirmationDialog<C> {
    pub fn open(command: C) -> Self {
        let heading = command.dialog_heading();
        Self { command, heading }
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    pub fn command(&self) -> &C {
        &self.command
    }

    /// Closes the dialog without side effects.
    pub fn cancel(self) -> C {
        debug!(heading = %self.heading, "Confirmation dialog cancelled");
        self.command
    }

    pub fn confirm(self) -> (C, Confirmation) {
        (self.command, Confirmation { _private: () })
    }

    pub async fn confirm_and_execute(
        self,
        store: Arc<dyn DocumentStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<C::Result, ServiceError> {
        let (command, confirmation) = self.confirm();
        command.execute(store, event_sender, confirmation).await
    }
}

/// Comments accompanying a state change must contain text.
pub(crate) fn validate_comment(comment: &str) -> Result<(), ValidationError> {
    if comment.trim().is_empty() {
        let mut err = ValidationError::new("comment");
        err.message = Some(Cow::Borrowed("Comment is required"));
        Err(err)
    } else {
        Ok(())
    }
}

/// Whitelisted server methods used by the workflow commands.
pub mod methods {
    pub const AMEND_PO: &str = "nirmaan_stack.api.po_amendment.amend_po";
    pub const CANCEL_PO: &str = "nirmaan_stack.api.po_cancellation.cancel_po";
    pub const MERGE_POS: &str = "nirmaan_stack.api.po_merge.handle_merge_pos";
    pub const APPROVE_CUSTOM_PR: &str = "nirmaan_stack.api.custom_pr.approve_custom_pr";
}

/// `data-cy` hooks of the interactive elements the flows drive.
pub mod hooks {
    pub const CANCEL_PO_BUTTON: &str = "cancel-po-button";
    pub const DELETE_PO_BUTTON: &str = "delete-po-button";
    pub const CANCEL_PO_CONFIRM_BUTTON: &str = "cancel-po-confirm-button";
    pub const AMEND_PO_BUTTON: &str = "amend-po-button";
    pub const AMEND_PO_EDIT_ITEM_BUTTON: &str = "amend-po-edit-item-button";
    pub const AMEND_PO_DIALOG_QUANTITY_INPUT: &str = "amend-po-dialog-quantity-input";
    pub const AMEND_PO_DIALOG_DELETE_BUTTON: &str = "amend-po-dialog-delete-button";
    pub const AMEND_PO_DIALOG_SAVE_BUTTON: &str = "amend-po-dialog-save-button";
    pub const AMEND_PO_COMMENT_INPUT: &str = "amend-po-comment-input";
    pub const AMEND_PO_CONFIRM_BUTTON: &str = "amend-po-confirm-button";
    pub const MERGE_PO_BUTTON: &str = "merge-po-button";
    pub const MERGE_PO_CANDIDATE_CHECKBOX: &str = "merge-po-candidate-checkbox";
    pub const MERGE_PO_PROCEED_BUTTON: &str = "merge-po-proceed-button";
    pub const MERGE_PO_CONFIRM_BUTTON: &str = "merge-po-confirm-button";
    pub const APPROVE_PR_VENDOR_BLOCK: &str = "approve-pr-vendor-block";
    pub const APPROVE_PR_ITEM_CHECKBOX: &str = "approve-pr-item-checkbox";
    pub const APPROVE_PR_BUTTON: &str = "approve-pr-button";
    pub const SR_APPROVE_BUTTON: &str = "sr-approve-button";
    pub const SR_REJECT_BUTTON: &str = "sr-reject-button";
    pub const SR_REJECT_COMMENT_INPUT: &str = "sr-reject-comment-input";
    pub const DIALOG_CANCEL_BUTTON: &str = "dialog-cancel-button";
    pub const DIALOG_CONFIRM_BUTTON: &str = "dialog-confirm-button";
}

lazy_static! {
    static ref SENT_BACK_ID: Regex = Regex::new(r"SB-\d{5,}-\d{6,}-(\d{5,})").unwrap();
}

/// Structured field carrying the sent-back record name, when the server sends one.
pub const SENT_BACK_FIELD: &str = "sent_back_id";

/// A sent-back record name and its trailing sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBackId {
    pub name: String,
    pub suffix: String,
}

impl SentBackId {
    pub fn parse(text: &str) -> Option<Self> {
        let captures = SENT_BACK_ID.captures(text)?;
        Some(Self {
            name: captures.get(0)?.as_str().to_string(),
            suffix: captures.get(1)?.as_str().to_string(),
        })
    }
}

/// Finds the sent-back id in a mutation response: the structured field first,
/// otherwise the first match in any string of the payload.
pub fn extract_sent_back_id(payload: &Value) -> Result<SentBackId, ServiceError> {
    if let Some(field) = message_field(payload, SENT_BACK_FIELD) {
        return field.as_str().and_then(SentBackId::parse).ok_or_else(|| {
            ServiceError::ExtractionError(format!("malformed {}: {}", SENT_BACK_FIELD, field))
        });
    }
    find_in_strings(payload).ok_or_else(|| {
        ServiceError::ExtractionError(format!("no sent-back id in response: {}", payload))
    })
}

fn find_in_strings(value: &Value) -> Option<SentBackId> {
    match value {
        Value::String(text) => SentBackId::parse(text),
        Value::Array(items) => items.iter().find_map(find_in_strings),
        Value::Object(map) => map.values().find_map(find_in_strings),
        _ => None,
    }
}

/// Polls a list until a row satisfies `predicate`, within the list-lookup budget.
pub async fn await_listed<F>(
    store: &dyn DocumentStore,
    doctype: &str,
    query: &ListQuery,
    timeouts: &FlowTimeouts,
    predicate: F,
) -> Result<Value, ServiceError>
where
    F: Fn(&Value) -> bool,
{
    let poll = async {
        loop {
            match store.list(doctype, query).await {
                Ok(rows) => {
                    if let Some(row) = rows.into_iter().find(|row| predicate(row)) {
                        return Ok(row);
                    }
                }
                Err(err @ (ServiceError::ExternalApiError(_) | ServiceError::Timeout(_))) => {
                    warn!(error = %err, "List lookup failed, retrying")
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(timeouts.poll_interval()).await;
        }
    };

    tokio::time::timeout(timeouts.list_lookup(), poll)
        .await
        .map_err(|_| {
            ServiceError::Timeout(format!(
                "not found in {} list within {} ms",
                doctype, timeouts.list_lookup_ms
            ))
        })?
}
