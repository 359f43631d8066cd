// Handlers module
// HTTP handlers for the blog backend

use axum::{http::StatusCode, response::IntoResponse};
use tracing::debug;

use crate::{error::ApiError, session::Db};

/// Health check handler
/// Runs `SELECT 1` through the request's session, so a healthy answer means
/// the pool can hand out a working connection.
pub async fn health_check(Db(session): Db) -> Result<impl IntoResponse, ApiError> {
    session.ping().await?;

    debug!(session = %session.id(), "Health check passed");
    Ok((StatusCode::OK, "OK"))
}
