use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use thiserror::Error;

/// Set once at startup. Production responses omit internal error detail.
static PRODUCTION_MODE: OnceCell<bool> = OnceCell::new();

pub fn set_production_mode(enabled: bool) {
    let _ = PRODUCTION_MODE.set(enabled);
}

fn is_production() -> bool {
    PRODUCTION_MODE.get().copied().unwrap_or(false)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    /// The payment provider rejected or failed a request. The HTTP status of
    /// the response mirrors the provider's status so callers can branch on it.
    #[error("Provider error ({status}): {message}")]
    Provider {
        status: u16,
        message: String,
        body: Option<String>,
    },

    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    /// Money was captured at the provider but the local record could not be
    /// written. Carries the provider transaction id for manual reconciliation.
    #[error("Payment captured but recording failed (transaction {transaction_id})")]
    RecordingFailed {
        transaction_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Database(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let redact = is_production();
        let mut partial_success = None;
        let mut transaction_id = None;
        let mut retry_after = None;

        let (status, error_message, details) = match self {
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(serde_json::json!(errors)),
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::TooManyRequests(msg, retry) => {
                retry_after = retry;
                (StatusCode::TOO_MANY_REQUESTS, msg, None)
            }
            AppError::Provider {
                status,
                message,
                body,
            } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                message,
                if redact {
                    None
                } else {
                    body.map(serde_json::Value::String)
                },
            ),
            AppError::ProviderAuth(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Payment provider authentication failed".to_string(),
                if redact {
                    None
                } else {
                    Some(serde_json::Value::String(msg))
                },
            ),
            AppError::Configuration(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service is not configured".to_string(),
                if redact {
                    None
                } else {
                    Some(serde_json::Value::String(msg))
                },
            ),
            AppError::Database(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                if redact {
                    None
                } else {
                    Some(serde_json::Value::String(err.to_string()))
                },
            ),
            AppError::RecordingFailed {
                transaction_id: txn,
                source,
            } => {
                partial_success = Some(true);
                transaction_id = Some(txn);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment was captured but could not be recorded".to_string(),
                    if redact {
                        None
                    } else {
                        Some(serde_json::Value::String(source.to_string()))
                    },
                )
            }
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                if redact {
                    None
                } else {
                    Some(serde_json::Value::String(format!("{err:#}")))
                },
            ),
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
                partial_success,
                transaction_id,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_mirrors_status() {
        let err = AppError::Provider {
            status: 503,
            message: "upstream down".to_string(),
            body: None,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn provider_error_with_unmappable_status_becomes_bad_gateway() {
        let err = AppError::Provider {
            status: 0,
            message: "garbage".to_string(),
            body: None,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn recording_failure_is_a_500() {
        let err = AppError::RecordingFailed {
            transaction_id: "TXN123".to_string(),
            source: anyhow::anyhow!("insert failed"),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let err = AppError::TooManyRequests("slow down".to_string(), Some(12));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER),
            Some(&axum::http::HeaderValue::from(12u64))
        );
    }
}
