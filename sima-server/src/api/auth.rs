//! Acting user resolution
//!
//! Authentication itself happens in front of this service; the fronting
//! layer passes the authenticated username in the `X-Sima-User` header.
//! Requests without a known user are rejected with 401.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sima_common::db::models::User;
use sima_common::db::users;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::{AppState, USER_HEADER};

/// The user on whose behalf a request runs, stored in request extensions
#[derive(Debug, Clone)]
pub struct ActingUser(pub User);

pub async fn user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let username = request
        .headers()
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_HEADER)))?
        .to_string();

    let mut conn = state.db.acquire().await?;
    let user = users::get_user_by_username(&mut conn, &username)
        .await?
        .ok_or_else(|| {
            warn!("Rejected request for unknown user {:?}", username);
            ApiError::Unauthorized(format!("unknown user {:?}", username))
        })?;
    drop(conn);

    debug!("Request by {} (staff: {})", user.username, user.is_staff);
    request.extensions_mut().insert(ActingUser(user));
    Ok(next.run(request).await)
}
