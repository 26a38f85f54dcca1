use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slog::Logger;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::models::Notification;
use crate::notifications::NotificationStore;
use crate::store::{DocumentStore, DocumentStoreExt};

/// Named events delivered by the server's socket channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum PushEventKind {
    #[serde(rename = "pr:new")]
    #[strum(serialize = "pr:new")]
    PrNew,
    #[serde(rename = "pr:approved")]
    #[strum(serialize = "pr:approved")]
    PrApproved,
    #[serde(rename = "pr:rejected")]
    #[strum(serialize = "pr:rejected")]
    PrRejected,
    #[serde(rename = "pr:vendorSelected")]
    #[strum(serialize = "pr:vendorSelected")]
    PrVendorSelected,
    #[serde(rename = "pr:delete")]
    #[strum(serialize = "pr:delete")]
    PrDelete,
    #[serde(rename = "po:new")]
    #[strum(serialize = "po:new")]
    PoNew,
    #[serde(rename = "po:amended")]
    #[strum(serialize = "po:amended")]
    PoAmended,
    #[serde(rename = "po:delete")]
    #[strum(serialize = "po:delete")]
    PoDelete,
    #[serde(rename = "sb:vendorSelected")]
    #[strum(serialize = "sb:vendorSelected")]
    SbVendorSelected,
    #[serde(rename = "sr:vendorSelected")]
    #[strum(serialize = "sr:vendorSelected")]
    SrVendorSelected,
    #[serde(rename = "sr:approved")]
    #[strum(serialize = "sr:approved")]
    SrApproved,
    #[serde(rename = "sr:amended")]
    #[strum(serialize = "sr:amended")]
    SrAmended,
    #[serde(rename = "sr:delete")]
    #[strum(serialize = "sr:delete")]
    SrDelete,
    #[serde(rename = "payment:new")]
    #[strum(serialize = "payment:new")]
    PaymentNew,
    #[serde(rename = "payment:approved")]
    #[strum(serialize = "payment:approved")]
    PaymentApproved,
    #[serde(rename = "payment:fulfilled")]
    #[strum(serialize = "payment:fulfilled")]
    PaymentFulfilled,
    #[serde(rename = "payment:delete")]
    #[strum(serialize = "payment:delete")]
    PaymentDelete,
}

/// A socket event: the kind plus the id of the notification to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub kind: PushEventKind,
    #[serde(rename = "notificationId")]
    pub notification_id: String,
}

impl PushEvent {
    pub fn new(kind: PushEventKind, notification_id: impl Into<String>) -> Self {
        Self {
            kind,
            notification_id: notification_id.into(),
        }
    }

    /// Builds an event from a raw socket frame: event name + `{notificationId}` payload.
    pub fn from_socket(name: &str, payload: &Value) -> Result<Self, ServiceError> {
        let kind = name
            .parse::<PushEventKind>()
            .map_err(|_| ServiceError::ValidationError(format!("unknown push event '{}'", name)))?;
        let notification_id = payload
            .get("notificationId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("push event '{}' has no notificationId", name))
            })?;
        Ok(Self::new(kind, notification_id))
    }
}

#[derive(Debug, Clone)]
pub struct EventSender<E = Event> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + std::fmt::Debug> EventSender<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and its sender.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: E) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted by workflow commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    PurchaseOrderAmended {
        po: String,
        sent_back: Option<String>,
    },
    PurchaseOrderCancelled {
        po: String,
        sent_back: String,
    },
    PurchaseOrderDeleted(String),
    PurchaseOrdersMerged {
        sources: Vec<String>,
        new_po: String,
    },
    ProcurementRequestApproved {
        pr: String,
        vendors: Vec<String>,
    },
    ServiceRequestApproved(String),
    ServiceRequestRejected {
        sr: String,
        comment: String,
    },
}

impl Event {
    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::PurchaseOrderAmended { .. } => "po_amended",
            Event::PurchaseOrderCancelled { .. } => "po_cancelled",
            Event::PurchaseOrderDeleted(_) => "po_deleted",
            Event::PurchaseOrdersMerged { .. } => "pos_merged",
            Event::ProcurementRequestApproved { .. } => "pr_approved",
            Event::ServiceRequestApproved(_) => "sr_approved",
            Event::ServiceRequestRejected { .. } => "sr_rejected",
        }
    }

    /// The document the event is about; the new PO for merges.
    pub fn subject(&self) -> &str {
        match self {
            Event::PurchaseOrderAmended { po, .. } | Event::PurchaseOrderCancelled { po, .. } => po,
            Event::PurchaseOrderDeleted(po) => po,
            Event::PurchaseOrdersMerged { new_po, .. } => new_po,
            Event::ProcurementRequestApproved { pr, .. } => pr,
            Event::ServiceRequestApproved(sr) | Event::ServiceRequestRejected { sr, .. } => sr,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

/// Drains domain events in order, handing each to every handler.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(?event, "Received event");
        for handler in &handlers {
            if let Err(e) = handler.handle_event(event.clone()).await {
                error!(?event, error = %e, "Event handler failed");
            }
        }
    }

    warn!("Event processing loop has ended");
}

/// Writes every workflow event to the session log.
pub struct EventLogger {
    logger: Logger,
}

impl EventLogger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl EventHandler for EventLogger {
    async fn handle_event(&self, event: Event) -> Result<(), String> {
        match &event {
            Event::PurchaseOrderAmended { sent_back, .. } => slog::info!(self.logger, "Workflow event";
                "event" => event.name(), "subject" => event.subject(), "sent_back" => ?sent_back),
            Event::PurchaseOrderCancelled { sent_back, .. } => slog::info!(self.logger, "Workflow event";
                "event" => event.name(), "subject" => event.subject(), "sent_back" => sent_back),
            Event::PurchaseOrdersMerged { sources, .. } => slog::info!(self.logger, "Workflow event";
                "event" => event.name(), "subject" => event.subject(), "sources" => sources.join(",")),
            _ => slog::info!(self.logger, "Workflow event";
                "event" => event.name(), "subject" => event.subject()),
        }
        Ok(())
    }
}

/// Applies socket events to the notification store, strictly in arrival order.
pub struct NotificationListener {
    store: Arc<dyn DocumentStore>,
    notifications: Arc<NotificationStore>,
}

impl NotificationListener {
    pub fn new(store: Arc<dyn DocumentStore>, notifications: Arc<NotificationStore>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Fetches the referenced notification and adds it. Returns whether it was new.
    pub async fn handle(&self, event: &PushEvent) -> Result<bool, ServiceError> {
        let notification: Notification = self.store.fetch(&event.notification_id).await?;
        Ok(self.notifications.add_new_notification(notification).await)
    }

    /// Runs until the channel closes; returns how many notifications were added.
    pub async fn run(self, mut rx: mpsc::Receiver<PushEvent>) -> usize {
        let mut added = 0;
        while let Some(event) = rx.recv().await {
            match self.handle(&event).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(kind = %event.kind, id = %event.notification_id, error = %e,
                        "Failed to fetch pushed notification");
                }
            }
        }
        info!(added, "Notification listener stopped");
        added
    }
}
