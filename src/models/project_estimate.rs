use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{doctypes, Doctype};

/// Budgeted quantity and rate for an item within a project category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEstimate {
    pub name: String,
    pub project: String,
    #[serde(default)]
    pub work_package: Option<String>,
    pub category: String,
    pub item: String,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity_estimate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub rate_estimate: Decimal,
}

impl ProjectEstimate {
    pub fn amount(&self) -> Decimal {
        self.quantity_estimate * self.rate_estimate
    }
}

impl Doctype for ProjectEstimate {
    const DOCTYPE: &'static str = doctypes::PROJECT_ESTIMATES;

    fn name(&self) -> &str {
        &self.name
    }
}
