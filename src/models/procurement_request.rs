use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::JsonList;
use crate::store::{doctypes, Doctype};
use crate::workflow::{ItemStatus, PrWorkflowState};

/// A request for materials raised against a project work package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementRequest {
    pub name: String,
    pub project: String,
    #[serde(default)]
    pub work_package: Option<String>,
    #[serde(default)]
    pub category_list: JsonList<CategoryRef>,
    #[serde(default)]
    pub procurement_list: JsonList<PrItem>,
    pub workflow_state: PrWorkflowState,
    #[serde(default)]
    pub creation: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub makes: Vec<String>,
}

/// One requested line. `name` is the catalogue item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrItem {
    pub name: String,
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub quote: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub tax: Option<Decimal>,
    pub status: ItemStatus,
}

impl Doctype for ProcurementRequest {
    const DOCTYPE: &'static str = doctypes::PROCUREMENT_REQUESTS;

    fn name(&self) -> &str {
        &self.name
    }
}

impl ProcurementRequest {
    /// Lines that count towards totals: everything except new-item requests.
    pub fn progressed_items(&self) -> impl Iterator<Item = &PrItem> {
        self.procurement_list
            .iter()
            .filter(|item| item.status != ItemStatus::Request)
    }

    pub fn vendors(&self) -> Vec<String> {
        let mut vendors: Vec<String> = self
            .procurement_list
            .iter()
            .filter_map(|item| item.vendor.clone())
            .collect();
        vendors.sort();
        vendors.dedup();
        vendors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_server_document() {
        let pr: ProcurementRequest = serde_json::from_value(json!({
            "name": "PR-000123",
            "project": "PROJ-01",
            "work_package": "Electrical Work",
            "category_list": {"list": [{"name": "Wiring", "makes": ["Havells"]}]},
            "procurement_list": {"list": [
                {"name": "ITEM-1", "item": "Cable 2.5 sqmm", "unit": "Mtrs", "quantity": 100, "status": "Pending", "category": "Wiring"},
                {"name": "ITEM-2", "item": "New Conduit", "quantity": 4.5, "quote": 12.25, "status": "Request"}
            ]},
            "workflow_state": "Pending",
            "owner": "pm@example.com"
        }))
        .unwrap();

        assert_eq!(pr.workflow_state, PrWorkflowState::Pending);
        assert_eq!(pr.procurement_list.len(), 2);
        assert_eq!(pr.procurement_list.list[1].quote, Some(Decimal::new(1225, 2)));
        assert_eq!(pr.progressed_items().count(), 1);
    }

    #[test]
    fn unknown_line_status_does_not_break_the_request() {
        let pr: ProcurementRequest = serde_json::from_value(json!({
            "name": "PR-000124",
            "project": "PROJ-01",
            "procurement_list": {"list": [
                {"name": "ITEM-1", "quantity": 10, "quote": 50, "status": "Pending", "vendor": "VEN-A"},
                {"name": "ITEM-2", "quantity": 2, "status": "Deleted"}
            ]},
            "workflow_state": "Vendor Selected"
        }))
        .unwrap();

        assert_eq!(pr.procurement_list.list[1].status, ItemStatus::Other);
        assert!(crate::workflow::PrView::ApprovePo.includes(&pr));
    }
}
