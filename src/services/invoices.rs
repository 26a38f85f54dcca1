use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::instrument;

use crate::errors::ServiceError;
use crate::models::{InvoiceStatus, VendorInvoice};
use crate::store::{DocumentStore, DocumentStoreExt, Filter, ListQuery};

/// Approved invoice amounts summed per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceTotals {
    totals: HashMap<String, Decimal>,
}

impl InvoiceTotals {
    /// Keyed by `document_name`.
    pub fn by_document(invoices: &[VendorInvoice]) -> Self {
        Self::group(invoices, |invoice| Some(invoice.document_name.clone()))
    }

    /// Keyed by [`project_key`]; invoices without a project are skipped.
    pub fn by_project(invoices: &[VendorInvoice]) -> Self {
        Self::group(invoices, |invoice| {
            invoice
                .project
                .as_deref()
                .map(|project| project_key(project, &invoice.document_type))
        })
    }

    fn group<F>(invoices: &[VendorInvoice], key: F) -> Self
    where
        F: Fn(&VendorInvoice) -> Option<String>,
    {
        let mut totals: HashMap<String, Decimal> = HashMap::new();
        for invoice in invoices
            .iter()
            .filter(|invoice| invoice.status == InvoiceStatus::Approved)
        {
            if let Some(key) = key(invoice) {
                *totals.entry(key).or_default() += invoice.invoice_amount;
            }
        }
        Self { totals }
    }

    /// Zero for unknown keys.
    pub fn get_total(&self, key: &str) -> Decimal {
        self.totals.get(key).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

pub fn project_key(project: &str, document_type: &str) -> String {
    format!("{}::{}", project, document_type)
}

/// Approved invoices attached to documents of `document_type`.
#[instrument(skip(store))]
pub async fn load_approved_invoices(
    store: &dyn DocumentStore,
    document_type: &str,
) -> Result<Vec<VendorInvoice>, ServiceError> {
    store
        .fetch_list(
            &ListQuery::new()
                .filter(Filter::eq("document_type", document_type))
                .filter(Filter::eq("status", InvoiceStatus::Approved.to_string())),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn invoices() -> Vec<VendorInvoice> {
        serde_json::from_value(json!([
            {"name": "VI-1", "document_type": "Procurement Orders", "document_name": "PO/1", "project": "P1", "invoice_amount": 1000.5, "status": "Approved"},
            {"name": "VI-2", "document_type": "Procurement Orders", "document_name": "PO/1", "project": "P1", "invoice_amount": 500, "status": "Approved"},
            {"name": "VI-3", "document_type": "Procurement Orders", "document_name": "PO/1", "project": "P1", "invoice_amount": 9999, "status": "Pending"},
            {"name": "VI-4", "document_type": "Service Requests", "document_name": "SR-1", "project": "P1", "invoice_amount": 250, "status": "Approved"}
        ]))
        .unwrap()
    }

    #[test]
    fn sums_only_approved_rows_per_document() {
        let totals = InvoiceTotals::by_document(&invoices());
        assert_eq!(totals.get_total("PO/1"), dec!(1500.5));
        assert_eq!(totals.get_total("SR-1"), dec!(250));
        assert_eq!(totals.get_total("PO/404"), Decimal::ZERO);
    }

    #[test]
    fn groups_by_project_and_document_type() {
        let totals = InvoiceTotals::by_project(&invoices());
        assert_eq!(totals.get_total(&project_key("P1", "Procurement Orders")), dec!(1500.5));
        assert_eq!(totals.get_total(&project_key("P1", "Service Requests")), dec!(250));
        assert_eq!(totals.len(), 2);
    }
}
