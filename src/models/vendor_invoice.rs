use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::store::{doctypes, Doctype};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Rejected,
}

/// Vendor invoice attached to a PO or SR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorInvoice {
    pub name: String,
    /// "Procurement Orders" or "Service Requests"
    pub document_type: String,
    pub document_name: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub invoice_no: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub invoice_amount: Decimal,
    pub status: InvoiceStatus,
}

impl Doctype for VendorInvoice {
    const DOCTYPE: &'static str = doctypes::VENDOR_INVOICES;

    fn name(&self) -> &str {
        &self.name
    }
}
