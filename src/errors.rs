use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User-facing rendering of an error: every failure of a user-initiated action
/// surfaces as a title/description pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastVariant {
    Success,
    Destructive,
}

impl Toast {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Success,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Destructive,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: invalid {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        ServiceError::ValidationError(messages.join("; "))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else {
            ServiceError::ExternalApiError(err.to_string())
        }
    }
}

impl From<crate::cache::CacheError> for ServiceError {
    fn from(err: crate::cache::CacheError) -> Self {
        ServiceError::CacheError(err.to_string())
    }
}

impl ServiceError {
    /// Short heading used for the toast title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not Found",
            Self::ValidationError(_) => "Invalid Input",
            Self::InvalidStatus(_) | Self::InvalidOperation(_) => "Action Not Allowed",
            Self::PreconditionFailed(_) => "Unexpected State",
            Self::ExtractionError(_) => "Unexpected Response",
            Self::ExternalApiError(_) => "Server Error",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Timeout(_) => "Timed Out",
            Self::EventError(_)
            | Self::CacheError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::Other(_) => "Failed!",
        }
    }

    /// Whether the enclosing flow must abort. Validation failures keep the user on
    /// the form; everything else in an orchestration is fatal.
    pub fn is_flow_fatal(&self) -> bool {
        !matches!(self, Self::ValidationError(_))
    }

    /// Description shown to the user. Internal details are not leaked.
    pub fn response_message(&self) -> String {
        match self {
            Self::CacheError(_) | Self::SerializationError(_) | Self::Other(_) => {
                "Internal error".to_string()
            }
            Self::NotFound(msg)
            | Self::ValidationError(msg)
            | Self::InvalidStatus(msg)
            | Self::InvalidOperation(msg)
            | Self::PreconditionFailed(msg)
            | Self::ExtractionError(msg)
            | Self::ExternalApiError(msg)
            | Self::Unauthorized(msg)
            | Self::Timeout(msg)
            | Self::EventError(msg)
            | Self::InternalError(msg) => msg.clone(),
        }
    }

    pub fn toast(&self) -> Toast {
        Toast::destructive(self.title(), self.response_message())
    }
}

/// Best-effort extraction of a human readable message from a Frappe error body.
///
/// Frappe nests its messages: `_server_messages` is a JSON string holding an array
/// of JSON strings, each an object with a `message` key. `exc` carries a
/// stringified traceback list; the last line is the useful one.
pub fn extract_server_message(body: &str) -> String {
    let trimmed = body.trim();
    let parsed: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => return fallback_message(trimmed),
    };

    if let Some(raw) = parsed.get("_server_messages").and_then(Value::as_str) {
        if let Some(message) = unwrap_server_messages(raw) {
            return message;
        }
    }

    if let Some(message) = parsed.get("message").and_then(message_text) {
        return message;
    }

    if let Some(message) = parsed.get("exception").and_then(Value::as_str) {
        if !message.trim().is_empty() {
            return message.trim().to_string();
        }
    }

    if let Some(exc) = parsed.get("exc").and_then(Value::as_str) {
        if let Some(message) = last_traceback_line(exc) {
            return message;
        }
    }

    fallback_message(trimmed)
}

fn unwrap_server_messages(raw: &str) -> Option<String> {
    let entries: Vec<Value> = serde_json::from_str(raw).ok()?;
    let messages: Vec<String> = entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(inner) => match serde_json::from_str::<Value>(inner) {
                Ok(obj) => obj.get("message").and_then(message_text),
                Err(_) => Some(inner.clone()),
            },
            other => other.get("message").and_then(message_text),
        })
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("\n"))
    }
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map.get("message").and_then(message_text),
        _ => None,
    }
}

fn last_traceback_line(exc: &str) -> Option<String> {
    let frames: Vec<String> = serde_json::from_str(exc).unwrap_or_else(|_| vec![exc.to_string()]);
    frames
        .last()
        .and_then(|frame| frame.lines().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string())
}

fn fallback_message(body: &str) -> String {
    if body.is_empty() {
        "Unknown server error".to_string()
    } else {
        body.chars().take(500).collect()
    }
}
