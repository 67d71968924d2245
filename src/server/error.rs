// HTTP mapping of pipeline errors
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::errors::QueryError;
use crate::pipeline::GENERIC_ERROR_MESSAGE;

/// Error returned by a handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
    internal: bool,
}

impl ApiError {
    /// 400 with `message` shown verbatim
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
            internal: false,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Endpoint not found".to_string(),
            details: None,
            internal: false,
        }
    }

    /// Validation errors become 400; everything else a generic 500 whose
    /// details are kept only when `expose_details` is set.
    pub fn from_query_error(err: QueryError, expose_details: bool) -> Self {
        if err.is_validation() {
            return Self::bad_request(err.to_string());
        }

        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: GENERIC_ERROR_MESSAGE.to_string(),
            details: expose_details.then(|| err.to_string()),
            internal: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = if self.internal {
            json!({
                "success": false,
                "error": self.message,
                "details": self.details,
            })
        } else {
            json!({
                "success": false,
                "error": self.message,
            })
        };

        (self.status, Json(body)).into_response()
    }
}
