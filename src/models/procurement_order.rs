use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::JsonList;
use crate::store::{doctypes, Doctype};
use crate::workflow::PoStatus;

/// Purchase order raised for one vendor out of an approved request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementOrder {
    pub name: String,
    pub project: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub vendor: String,
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub procurement_request: Option<String>,
    /// "true" when raised from a custom request
    #[serde(default)]
    pub custom: Option<String>,
    #[serde(default)]
    pub order_list: JsonList<PoItem>,
    pub status: PoStatus,
    /// Set on merged POs: the PO they were absorbed into
    #[serde(default)]
    pub merged: Option<String>,
    #[serde(default)]
    pub creation: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoItem {
    pub name: String,
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quote: Decimal,
    /// GST percentage, e.g. 18
    #[serde(default, with = "rust_decimal::serde::float")]
    pub tax: Decimal,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub makes: Option<String>,
    /// Source PO when this line came in through a merge
    #[serde(default)]
    pub po: Option<String>,
}

impl PoItem {
    pub fn amount(&self) -> Decimal {
        self.quantity * self.quote
    }
}

impl Doctype for ProcurementOrder {
    const DOCTYPE: &'static str = doctypes::PROCUREMENT_ORDERS;

    fn name(&self) -> &str {
        &self.name
    }
}

impl ProcurementOrder {
    pub fn is_custom(&self) -> bool {
        self.custom.as_deref() == Some("true")
    }

    pub fn item(&self, item_id: &str) -> Option<&PoItem> {
        self.order_list.iter().find(|line| line.name == item_id)
    }
}
