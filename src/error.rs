use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tokio_postgres::error::SqlState;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(String),

    /// Driver errors are carried as-is so callers can inspect the SQLSTATE.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Database session is closed")]
    SessionClosed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// SQLSTATE of the underlying driver error, if there is one.
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            ApiError::Postgres(err) => err.code(),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Database(ref err) => {
                tracing::error!("PostgreSQL database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            ApiError::Postgres(ref err) => classify_postgres(err),
            ApiError::Pool(ref err) => classify_pool(err),
            ApiError::SessionClosed => {
                tracing::error!("Request used a database session after it was closed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SESSION_CLOSED",
                    "An internal server error occurred".to_string(),
                )
            }
            ApiError::NotFound(ref resource) => {
                tracing::debug!("Resource not found: {}", resource);
                (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{} not found", resource),
                )
            }
            ApiError::Internal(ref err) => {
                tracing::error!("Internal server error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

// PostgreSQL error mapping
fn classify_postgres(err: &tokio_postgres::Error) -> (StatusCode, &'static str, String) {
    let validation = |message: &str| (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.to_string());

    match err.code() {
        Some(&SqlState::UNIQUE_VIOLATION) => {
            let message = if err.to_string().contains("email") {
                "Email address already exists"
            } else {
                "Resource already exists"
            };
            (StatusCode::CONFLICT, "CONFLICT", message.to_string())
        }
        Some(&SqlState::FOREIGN_KEY_VIOLATION) => validation("Referenced resource does not exist"),
        Some(&SqlState::NOT_NULL_VIOLATION) => validation("Required field is missing"),
        Some(&SqlState::CHECK_VIOLATION) => validation("Data validation constraint violated"),
        Some(&SqlState::INVALID_TEXT_REPRESENTATION) => validation("Invalid data format provided"),
        Some(&SqlState::NUMERIC_VALUE_OUT_OF_RANGE) => validation("Numeric value is out of range"),
        Some(&SqlState::STRING_DATA_RIGHT_TRUNCATION) => validation("Text data exceeds maximum length"),
        Some(&SqlState::CONNECTION_EXCEPTION)
        | Some(&SqlState::CONNECTION_DOES_NOT_EXIST)
        | Some(&SqlState::CONNECTION_FAILURE) => {
            tracing::error!("PostgreSQL connection error: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database service is temporarily unavailable".to_string(),
            )
        }
        _ => {
            tracing::error!("Unhandled PostgreSQL error: {} (code: {:?})", err, err.code());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            )
        }
    }
}

// Connection pool error mapping
fn classify_pool(err: &deadpool_postgres::PoolError) -> (StatusCode, &'static str, String) {
    let message = match err {
        deadpool_postgres::PoolError::Timeout(_) => {
            tracing::warn!("Database connection pool timeout: {}", err);
            "Database operation timed out, please try again"
        }
        deadpool_postgres::PoolError::Closed => {
            tracing::error!("Database connection pool is closed: {}", err);
            "Database service is temporarily unavailable"
        }
        _ => {
            tracing::error!("Database connection pool error: {}", err);
            "Database service is temporarily unavailable"
        }
    };

    (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        serde_json::from_slice(&bytes).expect("Body is not JSON")
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let response = ApiError::not_found("Post with id 7").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Post with id 7 not found");
    }

    #[tokio::test]
    async fn test_session_closed_response_hides_details() {
        let response = ApiError::SessionClosed.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "SESSION_CLOSED");
        assert_eq!(body["error"]["message"], "An internal server error occurred");
    }

    #[tokio::test]
    async fn test_internal_response() {
        let response = ApiError::from(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert!(!body.to_string().contains("secret detail"));
    }

    #[test]
    fn test_sql_state_absent_for_non_driver_errors() {
        assert!(ApiError::SessionClosed.sql_state().is_none());
        assert!(ApiError::not_found("User").sql_state().is_none());
    }
}
