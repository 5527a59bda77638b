use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};

use crate::credentials::decode_token;
use crate::error::ApiError;
use crate::state::{AppState, run_blocking};

/// Validate the bearer JWT and stash its `Claims` in the request extensions.
///
/// The account is re-read on every request, so tokens of deleted users stop
/// working before they expire.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| {
        ApiError::unauthorized(
            "Authentication required",
            "Missing or malformed Authorization header",
        )
    })?;

    let claims = decode_token(&state.auth, bearer.token()).map_err(|_| {
        ApiError::unauthorized("Authentication required", "Invalid or expired token")
    })?;

    let user_id = claims.sub;
    let exists =
        run_blocking(&state, move |s| Ok(s.db.get_user_by_id(user_id)?.is_some())).await?;
    if !exists {
        return Err(ApiError::unauthorized(
            "Authentication required",
            "The account for this token no longer exists",
        ));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
