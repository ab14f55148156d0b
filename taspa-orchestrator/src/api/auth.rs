//! Role gate for operator endpoints
//!
//! Every route except `/health` requires the `developer` role.

use axum::{extract::Request, middleware::Next, response::Response};
use taspa_common::api::{require_any, Role, ROLES_HEADER};
use tracing::debug;

use crate::error::ApiError;

pub async fn require_developer(request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(ROLES_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = require_any(header, &[Role::Developer]) {
        debug!(path = %request.uri().path(), "Rejected request: {}", e);
        return Err(e.into());
    }

    Ok(next.run(request).await)
}
