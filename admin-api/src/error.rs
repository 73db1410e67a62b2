use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{CoreError, ErrorExt};

/// A `CoreError` paired with the HTTP status it is reported under.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: CoreError,
}

impl ApiError {
    pub fn not_found(resource: String) -> Self {
        CoreError::NotFound { resource }.into()
    }

    pub fn bad_request(message: String) -> Self {
        CoreError::InvalidInput { message }.into()
    }

    /// For send-now: caller mistakes keep their status, anything else is a
    /// failed run.
    pub fn run_failed(error: CoreError) -> Self {
        let status = match status_for(&error) {
            status if status.is_client_error() => status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(error: &CoreError) -> StatusCode {
    match error {
        CoreError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::RunInProgress { .. } => StatusCode::CONFLICT,
        CoreError::RedditApi(_) | CoreError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        Self {
            status: status_for(&error),
            error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            self.error.log_error();
        } else {
            self.error.log_warn();
        }

        let body = Json(serde_json::json!({
            "error": self.error.user_friendly_message(),
            "code": self.error.error_code(),
        }));
        (self.status, body).into_response()
    }
}
