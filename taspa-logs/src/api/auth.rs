//! Role gate for producers and history readers

use axum::{extract::Request, middleware::Next, response::Response};
use taspa_common::api::{require_any, Role, ROLES_HEADER};
use tracing::debug;

use crate::error::ApiError;

/// Any recognized role passes
pub async fn require_any_role(request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(ROLES_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = require_any(header, &Role::ALL) {
        debug!(path = %request.uri().path(), "Rejected request: {}", e);
        return Err(e.into());
    }

    Ok(next.run(request).await)
}
