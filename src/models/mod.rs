//! Typed documents as stored on the Frappe site.

use serde::{Deserialize, Serialize};

pub mod approved_quotation;
pub mod notification;
pub mod procurement_order;
pub mod procurement_request;
pub mod project_estimate;
pub mod sent_back_category;
pub mod service_request;
pub mod user;
pub mod vendor_invoice;

pub use approved_quotation::ApprovedQuotation;
pub use notification::Notification;
pub use procurement_order::{PoItem, ProcurementOrder};
pub use procurement_request::{CategoryRef, PrItem, ProcurementRequest};
pub use project_estimate::ProjectEstimate;
pub use sent_back_category::{SbItem, SbType, SentBackCategory};
pub use service_request::{ServiceItem, ServiceRequest};
pub use user::{NewUserForm, NewVendorForm};
pub use vendor_invoice::{InvoiceStatus, VendorInvoice};

/// JSON child lists are stored as `{"list": [...]}` on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonList<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

impl<T> Default for JsonList<T> {
    fn default() -> Self {
        Self { list: Vec::new() }
    }
}

impl<T> From<Vec<T>> for JsonList<T> {
    fn from(list: Vec<T>) -> Self {
        Self { list }
    }
}

impl<T> JsonList<T> {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.list.iter()
    }
}

/// Frappe timestamps: `2024-05-01 10:22:31.123456`, with RFC 3339 accepted too.
pub mod frappe_datetime {
    use chrono::{DateTime, NaiveDateTime};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .ok()
            .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok())
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}
