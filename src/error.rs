use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Backing store or payment widget is missing, misconfigured, or rejected
    /// our credentials. Not retryable within a session.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Network or store hiccup. Recovered by the local fallback.
    #[error("Transient error: {0}")]
    Transient(String),

    #[error("Activation code already exists: {0}")]
    GenerationCollision(String),

    #[error("Could not generate a valid activation code after {attempts} attempts")]
    Generation { attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A code was already issued for this subscription.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the local fallback should absorb this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Http(_))
    }
}

/// User-facing messages.
pub mod msg {
    pub const GENERATING_CODE: &str = "Generating your premium code...";
    pub const CREATING_SUBSCRIPTION: &str = "Creating your subscription...";
    pub const SERVICE_UNAVAILABLE: &str =
        "Connection to the server failed. Please reload the page or try again later.";
    pub const ISSUANCE_FAILED: &str = "Error generating the premium code.";
    pub const UNKNOWN_PLAN: &str = "Unknown subscription plan";
    pub const MISSING_SUBSCRIPTION_ID: &str = "Subscription id is required";
    pub const INVALID_CODE: &str = "Invalid activation code";
    pub const WIDGET_TIMEOUT: &str = "Payment service did not become available in time";
    pub const INVALID_SUBSCRIPTION_ID: &str = "Malformed subscription id";
    pub const SUBSCRIPTION_NOT_APPROVED: &str = "Subscription has not been approved";
    pub const SUBSCRIPTION_PLAN_MISMATCH: &str = "Subscription does not match the selected plan";
    pub const ALREADY_ISSUED: &str = "A premium code was already issued for this subscription";
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            CheckoutError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            CheckoutError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            CheckoutError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg.clone())),
            CheckoutError::GenerationCollision(_) => (StatusCode::CONFLICT, "Conflict", None),
            CheckoutError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable",
                    Some(msg::SERVICE_UNAVAILABLE.to_string()),
                )
            }
            CheckoutError::Transient(msg) => {
                tracing::warn!("Transient error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream error", None)
            }
            CheckoutError::Http(e) => {
                tracing::warn!("HTTP error: {}", e);
                (StatusCode::BAD_GATEWAY, "Upstream error", None)
            }
            CheckoutError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            CheckoutError::Generation { .. } | CheckoutError::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
