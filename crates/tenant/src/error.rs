use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schemata_database::DatabaseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No tenant found for '{0}'")]
    TenantNotFound(String),

    #[error("Request has no Host header")]
    MissingHost,

    #[error("Tenant context was not resolved for this request")]
    MissingContext,

    #[error("No schema selected")]
    NoSelection,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoutingError {
    fn status(&self) -> StatusCode {
        match self {
            Self::TenantNotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingHost | Self::NoSelection => StatusCode::BAD_REQUEST,
            Self::MissingContext | Self::Database(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::TenantNotFound(_) => "tenant_not_found",
            Self::MissingHost => "missing_host",
            Self::MissingContext => "missing_tenant_context",
            Self::NoSelection => "no_selection",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
        }
    }
}

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Tenant routing failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse::new(self.code(), &message))).into_response()
    }
}
