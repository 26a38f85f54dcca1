use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{doctypes, Doctype};

/// A vendor price accepted on an earlier PO; the history used to estimate
/// unquoted lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedQuotation {
    pub name: String,
    pub item_id: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub procurement_order: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub quote: Decimal,
    #[serde(with = "super::frappe_datetime")]
    pub modified: NaiveDateTime,
}

impl Doctype for ApprovedQuotation {
    const DOCTYPE: &'static str = doctypes::APPROVED_QUOTATIONS;

    fn name(&self) -> &str {
        &self.name
    }
}
