use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

/// Unified error type for handlers; converts into the response envelope.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Infrastructure failure whose message is safe to show the caller
    /// (e.g. email delivery).
    ServiceFailure(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "conflict: {}", msg),
            ApiError::ServiceFailure(msg) => write!(f, "service failure: {}", msg),
            ApiError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceFailure(msg) => {
                tracing::error!(error = %msg, "service failure");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::Internal(msg) => {
                // Detail goes to the log, not to the client.
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong. Please try again later.".to_string(),
                )
            }
        };
        let body = Json(json!({ "status": "fail", "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("email") {
                        return ApiError::Conflict("Email already registered".to_string());
                    }
                    return ApiError::Conflict(format!("constraint violation: {}", constraint));
                }
                ApiError::Internal(format!("database error: {}", db_err))
            }
            _ => ApiError::Internal(format!("database error: {}", err)),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Repos wrap driver errors in anyhow; unwrap them so constraint
        // violations and missing rows keep their status mapping.
        match err.downcast::<sqlx::Error>() {
            Ok(db_err) => db_err.into(),
            Err(other) => ApiError::Internal(other.to_string()),
        }
    }
}

/// Success-side response envelope: `{status, token?, data?, message?}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: "success",
            token: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            token: None,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ApiError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "bad request: invalid input");

        let err = ApiError::NotFound("No tour found with that ID".to_string());
        assert_eq!(err.to_string(), "not found: No tour found with that ID");
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn envelope_data_serializes_without_empty_fields() {
        let env = Envelope::data(json!({ "name": "The Forest Hiker" }));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["data"]["name"], "The Forest Hiker");
        assert!(value.get("token").is_none());
        assert!(value.get("message").is_none());
    }

    #[test]
    fn envelope_with_token() {
        let env = Envelope::data(json!({})).with_token("abc".to_string());
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["token"], "abc");
    }

    #[test]
    fn envelope_message_only() {
        let env = Envelope::message("Token sent to email!");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["message"], "Token sent to email!");
        assert!(value.get("data").is_none());
    }
}
