use bytes::Bytes;
use reqwest::{header, Method};
use strum::{Display, EnumString};
use tracing::{error, info, instrument};

use crate::errors::{extract_server_message, ServiceError};
use crate::store::frappe::FrappeClient;

const PDF_METHOD_PREFIX: &str = "nirmaan_stack.api.pdf_helper";

/// Bulk PDF exports offered per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum BulkDownload {
    /// Purchase orders
    Pos,
    /// Work orders (service requests)
    Wos,
    Invoices,
    /// Delivery notes
    Dns,
}

impl BulkDownload {
    pub fn method(&self) -> String {
        format!("{}.download_all_{}", PDF_METHOD_PREFIX, self)
    }

    fn file_name(&self, project: &str) -> String {
        format!("{}_{}.pdf", project, self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub kind: BulkDownload,
    pub project: String,
    /// Include rates; only meaningful for POs and WOs
    pub with_rate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub file_name: String,
    pub content: Bytes,
}

/// Interprets a download response. Anything other than a PDF body is an
/// error payload, even on a 200.
pub fn interpret_response(
    status: u16,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<Bytes, ServiceError> {
    let is_pdf = content_type
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/pdf"))
        .unwrap_or(false);
    if (200..300).contains(&status) && is_pdf {
        return Ok(body);
    }
    let message = extract_server_message(&String::from_utf8_lossy(&body));
    if status == 404 {
        Err(ServiceError::NotFound(message))
    } else {
        Err(ServiceError::ExternalApiError(message))
    }
}

#[instrument(skip(client), fields(kind = %request.kind, project = %request.project))]
pub async fn download(client: &FrappeClient, request: &DownloadRequest) -> Result<PdfDocument, ServiceError> {
    let url = client.endpoint(&["api", "method", &request.kind.method()])?;
    let params = [
        ("project", request.project.clone()),
        ("with_rate", request.with_rate.to_string()),
    ];
    let response = client
        .request(Method::GET, url)
        .header(header::ACCEPT, "application/pdf, application/json")
        .query(&params)
        .send()
        .await?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await?;

    match interpret_response(status, content_type.as_deref(), body) {
        Ok(content) => {
            info!(bytes = content.len(), "Downloaded PDF");
            Ok(PdfDocument {
                file_name: request.kind.file_name(&request.project),
                content,
            })
        }
        Err(err) => {
            error!(error = %err, "PDF download failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn method_names() {
        assert_eq!(
            BulkDownload::Pos.method(),
            "nirmaan_stack.api.pdf_helper.download_all_pos"
        );
        assert_eq!("dns".parse::<BulkDownload>().unwrap(), BulkDownload::Dns);
    }

    #[test]
    fn pdf_body_passes_through() {
        let body = Bytes::from_static(b"%PDF-1.7");
        assert_eq!(
            interpret_response(200, Some("application/pdf"), body.clone()).unwrap(),
            body
        );
    }

    #[test]
    fn json_on_success_status_is_an_error() {
        let body = Bytes::from(
            r#"{"exc_type":"ValidationError","_server_messages":"[\"{\\\"message\\\": \\\"No POs found for project\\\"}\"]"}"#,
        );
        let err = interpret_response(200, Some("application/json"), body).unwrap_err();
        assert_matches!(err, ServiceError::ExternalApiError(msg) if msg == "No POs found for project");
    }
}
