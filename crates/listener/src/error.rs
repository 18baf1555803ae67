//! HTTP error shape shared by every route.
//!
//! Handlers return `Result<_, ApiError>`; the error renders as
//! `{"code": "...", "message": "..."}` with a status matching its class.
//! Store faults are logged here and reported with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge::{RelayError, SetupError, StoreError};
use serde::Serialize;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable class, e.g. `not_found`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

/// A status code paired with a JSON error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status of the response.
    pub status: StatusCode,
    /// Rendered as the JSON response body.
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Logs `err` and hides its detail from the caller.
    pub fn internal(message: &str, err: &StoreError) -> Self {
        tracing::error!(error = %err, "{message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<SetupError> for ApiError {
    fn from(err: SetupError) -> Self {
        match err {
            SetupError::MissingCredentials
            | SetupError::MissingState
            | SetupError::InvalidInstallationId => Self::bad_request(err.to_string()),
            SetupError::UnknownState | SetupError::MappingNotFound(_) => {
                Self::not_found(err.to_string())
            }
            SetupError::ExpiredState => Self::new(StatusCode::GONE, "expired", err.to_string()),
            SetupError::Store(store) => Self::internal("installation store failure", &store),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Build(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_event", err.to_string())
            }
            RelayError::Publish(_) => {
                Self::new(StatusCode::BAD_GATEWAY, "publish_failed", "publish failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge::{BuildError, InstallationId, PublishError};

    #[test]
    fn setup_errors_map_to_distinct_statuses() {
        let cases = [
            (SetupError::MissingCredentials, StatusCode::BAD_REQUEST),
            (SetupError::MissingState, StatusCode::BAD_REQUEST),
            (SetupError::InvalidInstallationId, StatusCode::BAD_REQUEST),
            (SetupError::UnknownState, StatusCode::NOT_FOUND),
            (SetupError::ExpiredState, StatusCode::GONE),
            (
                SetupError::MappingNotFound(InstallationId::new(1).unwrap()),
                StatusCode::NOT_FOUND,
            ),
            (
                SetupError::Store(StoreError::Backend("disk full".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn store_fault_detail_is_not_exposed() {
        let err = ApiError::from(SetupError::Store(StoreError::Backend("secret path".into())));
        assert!(!err.body.message.contains("secret path"));
        assert_eq!(err.body.code, "internal");
    }

    #[test]
    fn relay_errors_split_validation_from_delivery() {
        let build = ApiError::from(RelayError::Build(BuildError::MissingEnvironment));
        assert_eq!(build.status, StatusCode::UNPROCESSABLE_ENTITY);
        let publish = ApiError::from(RelayError::Publish(PublishError::Rejected {
            status: 500,
            body: "boom".into(),
        }));
        assert_eq!(publish.status, StatusCode::BAD_GATEWAY);
        assert!(!publish.body.message.contains("boom"));
    }
}
