// src/error.rs
use thiserror::Error;
use actix_web::{http::StatusCode, ResponseError, HttpResponse};
use serde_json::json;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientFunds {
        required: String,
        available: String,
    },

    // Also returned for shadow-limited seekers so the restriction is never
    // observable from the outside.
    #[error("No listeners available right now")]
    NoListenersAvailable,

    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for EngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(json!({
            "error": self.error_code(),
            "message": self.to_string(),
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Authorization(_) => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            EngineError::NoListenersAvailable => StatusCode::NOT_FOUND,
            EngineError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            EngineError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl EngineError {
    pub fn error_code(&self) -> &str {
        match self {
            EngineError::Validation(_) => "invalid_request",
            EngineError::Authorization(_) => "not_authorized",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(_) => "conflict",
            EngineError::InsufficientFunds { .. } => "insufficient_balance",
            EngineError::NoListenersAvailable => "no_listeners_available",
            EngineError::RateLimited(_) => "rate_limited",
            EngineError::ExternalService(_) => "external_service_error",
            EngineError::Internal(_) => "internal_error",
        }
    }
}
