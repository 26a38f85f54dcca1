use async_trait::async_trait;
use reqwest::{header, multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use super::{query, DocumentStore, FileUpload, Filter, ListQuery, UploadedFile};
use crate::{config::AppConfig, errors::extract_server_message, errors::ServiceError};

/// HTTP implementation of [`DocumentStore`] against a Frappe site.
#[derive(Clone)]
pub struct FrappeClient {
    http: Client,
    base: Url,
    authorization: Option<String>,
}

impl FrappeClient {
    pub fn new(
        base_url: &str,
        authorization: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let base = Url::parse(base_url)
            .map_err(|e| ServiceError::ValidationError(format!("invalid frappe url: {}", e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        Ok(Self {
            http,
            base,
            authorization,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            &config.frappe_url,
            config.authorization(),
            config.timeouts.mutation(),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Builds `<base>/<segments...>` with each segment percent-encoded, so names
    /// such as `PO/2024/00042` stay a single path segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ServiceError::ValidationError("frappe url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn method_url(&self, method: &str) -> Result<Url, ServiceError> {
        self.endpoint(&["api", "method", method])
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match &self.authorization {
            Some(token) => builder.header(header::AUTHORIZATION, token),
            None => builder,
        }
    }

    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response, ServiceError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_server_message(&body);
        error!(status = status.as_u16(), message = %message, "Document store request failed");
        Err(match status {
            StatusCode::NOT_FOUND => ServiceError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                ServiceError::Timeout(message)
            }
            StatusCode::EXPECTATION_FAILED | StatusCode::UNPROCESSABLE_ENTITY => {
                ServiceError::ValidationError(message)
            }
            _ => ServiceError::ExternalApiError(message),
        })
    }

    async fn json(&self, builder: RequestBuilder) -> Result<Value, ServiceError> {
        let response = self.send(builder).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ServiceError::ExternalApiError(format!("malformed JSON response: {}", e))
        })
    }
}

fn take(mut envelope: Value, key: &str) -> Result<Value, ServiceError> {
    envelope
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| ServiceError::ExternalApiError(format!("response missing `{}`", key)))
}

#[async_trait]
impl DocumentStore for FrappeClient {
    #[instrument(skip(self, query), fields(filters = query.filters.len()))]
    async fn list(&self, doctype: &str, query: &ListQuery) -> Result<Vec<Value>, ServiceError> {
        let url = self.endpoint(&["api", "resource", doctype])?;
        let mut params = vec![
            ("fields", query.fields_param()),
            ("filters", query.filters_param()),
        ];
        if let Some(order_by) = &query.order_by {
            params.push(("order_by", order_by.to_string()));
        }
        // Frappe pages at 20 by default; 0 means "all rows".
        params.push((
            "limit_page_length",
            query.limit.unwrap_or(0).to_string(),
        ));

        let envelope = self.json(self.request(Method::GET, url).query(&params)).await?;
        match take(envelope, "data")? {
            Value::Array(rows) => {
                debug!(rows = rows.len(), "Listed documents");
                Ok(rows)
            }
            other => Err(ServiceError::ExternalApiError(format!(
                "expected a list of {} documents, got {}",
                doctype, other
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn get(&self, doctype: &str, name: &str) -> Result<Value, ServiceError> {
        let url = self.endpoint(&["api", "resource", doctype, name])?;
        let envelope = self.json(self.request(Method::GET, url)).await?;
        take(envelope, "data")
    }

    #[instrument(skip(self, doc))]
    async fn create(&self, doctype: &str, doc: Value) -> Result<Value, ServiceError> {
        let url = self.endpoint(&["api", "resource", doctype])?;
        let envelope = self.json(self.request(Method::POST, url).json(&doc)).await?;
        take(envelope, "data")
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, doctype: &str, name: &str, patch: Value) -> Result<Value, ServiceError> {
        let url = self.endpoint(&["api", "resource", doctype, name])?;
        let envelope = self.json(self.request(Method::PUT, url).json(&patch)).await?;
        take(envelope, "data")
    }

    #[instrument(skip(self))]
    async fn delete(&self, doctype: &str, name: &str) -> Result<(), ServiceError> {
        let url = self.endpoint(&["api", "resource", doctype, name])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    #[instrument(skip(self, filters))]
    async fn count(&self, doctype: &str, filters: &[Filter]) -> Result<u64, ServiceError> {
        let url = self.method_url("frappe.client.get_count")?;
        let params = [
            ("doctype", doctype.to_string()),
            ("filters", query::filters_param(filters)),
        ];
        let envelope = self.json(self.request(Method::GET, url).query(&params)).await?;
        take(envelope, "message")?
            .as_u64()
            .ok_or_else(|| ServiceError::ExternalApiError("count is not a number".to_string()))
    }

    #[instrument(skip(self, args))]
    async fn call(&self, method: &str, args: Value) -> Result<Value, ServiceError> {
        let url = self.method_url(method)?;
        let envelope = self.json(self.request(Method::POST, url).json(&args)).await?;
        // Whitelisted methods returning None produce an empty envelope.
        Ok(take(envelope, "message").unwrap_or(Value::Null))
    }

    #[instrument(skip(self, file), fields(doctype = %file.doctype, docname = %file.docname))]
    async fn upload(&self, file: FileUpload) -> Result<UploadedFile, ServiceError> {
        let url = self.method_url("upload_file")?;
        let part = multipart::Part::bytes(file.content.to_vec()).file_name(file.file_name);
        let form = multipart::Form::new()
            .part("file", part)
            .text("doctype", file.doctype)
            .text("docname", file.docname)
            .text("fieldname", file.fieldname)
            .text("is_private", if file.is_private { "1" } else { "0" });

        let envelope = self.json(self.request(Method::POST, url).multipart(form)).await?;
        Ok(serde_json::from_value(take(envelope, "message")?)?)
    }
}
