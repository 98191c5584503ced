use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

pub const UPSTREAM_UNAVAILABLE_MESSAGE: &str =
    "The video is unavailable, private, geo-blocked, or rate-limited.";
const UPSTREAM_STATUS_MESSAGE: &str = "Failed to fetch MP3. Please try again.";
const MISSING_LINK_MESSAGE: &str = "No download URL received from the conversion API.";
const CONVERSION_FAILED_MESSAGE: &str = "Conversion failed: MP3 file was not created.";
const INTERNAL_MESSAGE: &str = "Unexpected server error. Please try again later.";

/// Why a single conversion job did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("conversion API answered with status {0}")]
    UpstreamStatus(StatusCode),
    #[error("conversion API response carried no download link")]
    MissingDownloadLink,
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: Some("INVALID_URL"),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: Some("INTERNAL"),
        }
    }
}

impl From<ConversionError> for ApiError {
    fn from(value: ConversionError) -> Self {
        match value {
            ConversionError::InvalidInput(message) => Self::bad_request(message),
            ConversionError::UpstreamUnavailable(_) => Self {
                status: StatusCode::BAD_REQUEST,
                message: UPSTREAM_UNAVAILABLE_MESSAGE.to_string(),
                code: Some("UPSTREAM_UNAVAILABLE"),
            },
            ConversionError::UpstreamStatus(status) => Self {
                status: if status.is_client_error() || status.is_server_error() {
                    status
                } else {
                    StatusCode::BAD_GATEWAY
                },
                message: UPSTREAM_STATUS_MESSAGE.to_string(),
                code: Some("UPSTREAM_ERROR"),
            },
            ConversionError::MissingDownloadLink => Self {
                status: StatusCode::BAD_GATEWAY,
                message: MISSING_LINK_MESSAGE.to_string(),
                code: Some("NO_DOWNLOAD_LINK"),
            },
            ConversionError::ConversionFailed(detail) => {
                error!("Conversion produced no usable output: {detail}");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: CONVERSION_FAILED_MESSAGE.to_string(),
                    code: Some("CONVERSION_FAILED"),
                }
            }
            ConversionError::Internal(detail) => {
                error!("Unexpected conversion error: {detail}");
                Self::internal(INTERNAL_MESSAGE)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
        });

        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_keeps_its_message() {
        let api = ApiError::from(ConversionError::InvalidInput("Invalid YouTube URL".into()));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.message, "Invalid YouTube URL");
    }

    #[test]
    fn upstream_status_is_relayed_when_it_is_an_error() {
        let api = ApiError::from(ConversionError::UpstreamStatus(
            StatusCode::TOO_MANY_REQUESTS,
        ));
        assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api.code, Some("UPSTREAM_ERROR"));

        let odd = ApiError::from(ConversionError::UpstreamStatus(StatusCode::NO_CONTENT));
        assert_eq!(odd.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let api = ApiError::from(ConversionError::Internal("socket reset by peer".into()));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("socket"));
    }

    #[test]
    fn missing_link_is_a_bad_gateway() {
        let api = ApiError::from(ConversionError::MissingDownloadLink);
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
    }
}
