// rest_api/src/errors.rs

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lib::errors::ServiceError;
use log::{error, warn};
use security::AuthError;
use thiserror::Error;

use crate::response::ApiResponse;

const GENERIC_SERVER_ERROR: &str = "Something went wrong on the server";

// Define the REST API error enum
#[derive(Debug, Error)]
pub enum RestApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    BadRequest(String),
}

// Extractor rejections are reported through the same envelope as every
// other client error.
impl From<JsonRejection> for RestApiError {
    fn from(rejection: JsonRejection) -> Self {
        RestApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for RestApiError {
    fn from(rejection: PathRejection) -> Self {
        RestApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for RestApiError {
    fn from(rejection: QueryRejection) -> Self {
        RestApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for RestApiError {
    fn from(rejection: MultipartRejection) -> Self {
        RestApiError::BadRequest(rejection.body_text())
    }
}

fn service_parts(err: &ServiceError) -> (StatusCode, &'static str) {
    match err {
        ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        ServiceError::Expired => (StatusCode::GONE, "TOKEN_EXPIRED"),
        ServiceError::Revoked => (StatusCode::GONE, "TOKEN_REVOKED"),
        ServiceError::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
        ServiceError::Internal(_) | ServiceError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl RestApiError {
    /// Status, machine-readable code and the message safe to send.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            RestApiError::Service(e) | RestApiError::Auth(AuthError::Service(e)) => {
                let (status, code) = service_parts(e);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    (status, code, GENERIC_SERVER_ERROR.to_string())
                } else {
                    (status, code, e.to_string())
                }
            }
            RestApiError::Auth(AuthError::InvalidInput(e)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            RestApiError::Auth(AuthError::Jwt(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", GENERIC_SERVER_ERROR.to_string())
            }
            RestApiError::Auth(AuthError::Provider(_)) => (
                StatusCode::UNAUTHORIZED,
                "AUTH_FAILED",
                "DigiLocker authentication failed".to_string(),
            ),
            RestApiError::Auth(e) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", e.to_string()),
            RestApiError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", e.body_text())
            }
            RestApiError::Multipart(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.body_text()),
            RestApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        }
    }
}

// Implement IntoResponse for RestApiError to convert it into an HTTP response
impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else if matches!(status, StatusCode::FORBIDDEN | StatusCode::GONE) {
            warn!("Request refused ({}): {}", code, self);
        }
        (status, Json(ApiResponse::<()>::error(code, message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::errors::ValidationError;

    #[test]
    fn should_map_domain_errors_to_status_codes() {
        let cases = [
            (RestApiError::from(ServiceError::from(ValidationError::EmptyRecordSelection)), 400, "VALIDATION_ERROR"),
            (RestApiError::from(ServiceError::forbidden("no")), 403, "FORBIDDEN"),
            (RestApiError::from(ServiceError::not_found("Record")), 404, "NOT_FOUND"),
            (RestApiError::from(ServiceError::Expired), 410, "TOKEN_EXPIRED"),
            (RestApiError::from(ServiceError::Revoked), 410, "TOKEN_REVOKED"),
            (RestApiError::from(ServiceError::PayloadTooLarge { limit: 1 }), 413, "PAYLOAD_TOO_LARGE"),
            (RestApiError::from(AuthError::MissingCredential), 401, "UNAUTHORIZED"),
        ];
        for (err, status, code) in cases {
            let (got_status, got_code, _) = err.parts();
            assert_eq!(got_status.as_u16(), status);
            assert_eq!(got_code, code);
        }
    }

    #[test]
    fn should_report_rejected_json_as_validation_error() {
        let rejection = JsonRejection::from(axum::extract::rejection::MissingJsonContentType::default());
        let (status, code, message) = RestApiError::from(rejection).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
        assert!(message.contains("Content-Type"));
    }

    #[test]
    fn should_hide_internal_detail() {
        let err = RestApiError::from(ServiceError::Internal("disk on fire".into()));
        let (status, _, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, GENERIC_SERVER_ERROR);
    }
}
