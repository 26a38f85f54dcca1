use serde::{Deserialize, Serialize};

use crate::store::{doctypes, Doctype};

pub const SEEN: &str = "true";
pub const UNSEEN: &str = "false";

/// In-app notification. `seen` is stored as the strings "true" / "false".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    #[serde(default)]
    pub docname: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    pub seen: String,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub recipient_role: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub work_package: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default, rename = "type")]
    pub notification_type: Option<String>,
    #[serde(default)]
    pub creation: Option<String>,
}

impl Notification {
    /// Counted by the unseen counter.
    pub fn is_unseen(&self) -> bool {
        self.seen == UNSEEN
    }

    pub fn is_seen(&self) -> bool {
        self.seen == SEEN
    }
}

impl Doctype for Notification {
    const DOCTYPE: &'static str = doctypes::NOTIFICATIONS;

    fn name(&self) -> &str {
        &self.name
    }
}
