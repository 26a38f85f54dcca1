//! Document store seam.
//!
//! All persistence lives on the remote Frappe site. The rest of the crate talks to
//! it through [`DocumentStore`], which is implemented over HTTP by
//! [`frappe::FrappeClient`] and in process by [`memory::InMemoryStore`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ServiceError;

pub mod frappe;
pub mod memory;
pub mod query;

pub use query::{Filter, FilterValue, ListQuery, OrderBy, SortOrder};

/// Doctype names as registered on the server.
pub mod doctypes {
    pub const PROCUREMENT_REQUESTS: &str = "Procurement Requests";
    pub const PROCUREMENT_ORDERS: &str = "Procurement Orders";
    pub const SENT_BACK_CATEGORY: &str = "Sent Back Category";
    pub const SERVICE_REQUESTS: &str = "Service Requests";
    pub const VENDOR_INVOICES: &str = "Vendor Invoices";
    pub const APPROVED_QUOTATIONS: &str = "Approved Quotations";
    pub const PROJECT_ESTIMATES: &str = "Project Estimates";
    pub const NOTIFICATIONS: &str = "Nirmaan Notifications";
    pub const COMMENTS: &str = "Nirmaan Comments";
    pub const VENDORS: &str = "Vendors";
    pub const PROJECTS: &str = "Projects";
}

/// A file to attach to a document.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content: Bytes,
    pub doctype: String,
    pub docname: String,
    pub fieldname: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_url: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, doctype: &str, query: &ListQuery) -> Result<Vec<Value>, ServiceError>;

    async fn get(&self, doctype: &str, name: &str) -> Result<Value, ServiceError>;

    async fn create(&self, doctype: &str, doc: Value) -> Result<Value, ServiceError>;

    async fn update(&self, doctype: &str, name: &str, patch: Value)
        -> Result<Value, ServiceError>;

    async fn delete(&self, doctype: &str, name: &str) -> Result<(), ServiceError>;

    async fn count(&self, doctype: &str, filters: &[Filter]) -> Result<u64, ServiceError>;

    /// Invokes a whitelisted server method and returns its `message` payload.
    async fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError>;

    async fn upload(&self, file: FileUpload) -> Result<UploadedFile, ServiceError>;
}

/// A typed document bound to its doctype.
pub trait Doctype: Serialize + DeserializeOwned + Send + Sync {
    const DOCTYPE: &'static str;

    fn name(&self) -> &str;
}

/// Typed access on top of any store.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn fetch<T: Doctype>(&self, name: &str) -> Result<T, ServiceError> {
        let raw = self.get(T::DOCTYPE, name).await?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn fetch_list<T: Doctype>(&self, query: &ListQuery) -> Result<Vec<T>, ServiceError> {
        self.list(T::DOCTYPE, query)
            .await?
            .into_iter()
            .map(|raw| serde_json::from_value(raw).map_err(ServiceError::from))
            .collect()
    }

    async fn insert<T: Doctype>(&self, doc: &T) -> Result<T, ServiceError> {
        let raw = self.create(T::DOCTYPE, serde_json::to_value(doc)?).await?;
        Ok(serde_json::from_value(raw)?)
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Reads `message.<field>` style payloads returned by whitelisted methods.
pub fn message_field<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    payload.get(field).or_else(|| {
        payload
            .get("message")
            .and_then(|message| message.get(field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_field_reads_flat_and_nested_payloads() {
        let flat = json!({"new_po_name": "PO/2024/00042"});
        let nested = json!({"message": {"new_po_name": "PO/2024/00042"}});
        assert_eq!(
            message_field(&flat, "new_po_name").and_then(Value::as_str),
            Some("PO/2024/00042")
        );
        assert_eq!(
            message_field(&nested, "new_po_name").and_then(Value::as_str),
            Some("PO/2024/00042")
        );
        assert!(message_field(&flat, "missing").is_none());
    }
}
