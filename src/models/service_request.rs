use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::JsonList;
use crate::store::{doctypes, Doctype};
use crate::workflow::SrWorkflowState;

/// Service request / work order; mirrors the PO lifecycle for services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub name: String,
    pub project: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub service_order_list: JsonList<ServiceItem>,
    #[serde(default)]
    pub gst: Option<String>,
    pub workflow_state: SrWorkflowState,
    #[serde(default)]
    pub creation: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub id: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub uom: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub rate: Option<Decimal>,
}

impl Doctype for ServiceRequest {
    const DOCTYPE: &'static str = doctypes::SERVICE_REQUESTS;

    fn name(&self) -> &str {
        &self.name
    }
}

impl ServiceRequest {
    /// "true" on the `gst` field means 18% GST applies to the whole order.
    pub fn gst_applicable(&self) -> bool {
        self.gst.as_deref() == Some("true")
    }
}
