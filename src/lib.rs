//! Nirmaan procurement core
//!
//! Typed documents, workflow state tables, totals and the confirmation-gated
//! workflow commands (amend, cancel, delete and merge POs, approve custom PRs,
//! approve and reject service requests) against a Frappe document store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod commands;
pub mod common;
pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod models;
pub mod notifications;
pub mod services;
pub mod store;
pub mod workflow;

use std::sync::Arc;

/// Shared handles a session works with.
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub store: Arc<dyn store::DocumentStore>,
    pub event_sender: Arc<events::EventSender>,
    pub notifications: Arc<notifications::NotificationStore>,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        store: Arc<dyn store::DocumentStore>,
        event_sender: Arc<events::EventSender>,
        notifications: Arc<notifications::NotificationStore>,
    ) -> Self {
        Self {
            config,
            store,
            event_sender,
            notifications,
        }
    }

    pub fn timeouts(&self) -> &config::FlowTimeouts {
        &self.config.timeouts
    }
}

pub mod prelude {
    pub use crate::commands::{Command, ConfirmationDialog};
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::models::*;
    pub use crate::store::{DocumentStore, DocumentStoreExt};
    pub use crate::workflow::WorkflowStatus;
    pub use crate::AppState;
}
