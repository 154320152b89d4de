use thiserror::Error;

use crate::validate::ValidationError;

/// Failures surfaced by the HTTP client and the API facade.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("server responded with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("session expired; log in again")]
    AuthExpired,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Local(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status if a response was received at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::AuthExpired => Some(401),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Text shown to the person at the terminal.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http { status, body } => {
                let detail = server_detail(body).unwrap_or_else(|| body.trim().to_string());
                if detail.is_empty() {
                    format!("request failed (HTTP {status})")
                } else {
                    format!("request failed (HTTP {status}): {detail}")
                }
            }
            ApiError::AuthExpired => "your session expired; run `taskpad login`".to_string(),
            ApiError::Network(_) => "could not reach the server; please try again".to_string(),
            ApiError::Decode(_) => "the server sent an unexpected response".to_string(),
            ApiError::Validation(err) => err.to_string(),
            ApiError::Local(err) => format!("local error: {err:#}"),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

// Django REST framework reports errors as {"detail": ".."} or as
// per-field lists, e.g. {"username": ["already taken"]}.
fn server_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    if let Some(detail) = object.get("detail").and_then(|d| d.as_str()) {
        return Some(detail.to_string());
    }

    let parts: Vec<String> = object
        .iter()
        .filter_map(|(field, messages)| {
            let text = match messages {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                _ => return None,
            };
            Some(format!("{field}: {text}"))
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}
