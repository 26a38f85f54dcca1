use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::JsonList;
use crate::store::{doctypes, Doctype};
use crate::workflow::SbWorkflowState;

/// Why value was sent back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum SbType {
    Rejected,
    Delayed,
    Cancelled,
}

/// Value removed from a PO or PR that must be re-procured or dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentBackCategory {
    pub name: String,
    #[serde(default)]
    pub procurement_request: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub item_list: JsonList<SbItem>,
    pub workflow_state: SbWorkflowState,
    #[serde(rename = "type")]
    pub sb_type: SbType,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub creation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbItem {
    pub name: String,
    #[serde(default)]
    pub item: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub quote: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Doctype for SentBackCategory {
    const DOCTYPE: &'static str = doctypes::SENT_BACK_CATEGORY;

    fn name(&self) -> &str {
        &self.name
    }
}

impl SentBackCategory {
    /// Trailing sequence of the record name, e.g. `00012` for `SB-00001-000123-00012`.
    pub fn suffix(&self) -> &str {
        self.name.rsplit('-').next().unwrap_or(&self.name)
    }
}
