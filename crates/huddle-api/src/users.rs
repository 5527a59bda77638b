use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use huddle_types::api::{ApiResponse, Claims, SignInRequest, SignUpRequest};

use crate::error::{ApiJson, ApiResult};
use crate::services::UserService;
use crate::state::{AppState, run_blocking};

pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignUpRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = run_blocking(&state, move |s| {
        UserService::new(&s.db, &s.mailer).sign_up(&req.username, &req.email, &req.password)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(user, "Successfully signed up")),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = run_blocking(&state, move |s| {
        UserService::new(&s.db, &s.mailer).sign_in(&s.auth, &req.email, &req.password)
    })
    .await?;

    Ok(Json(ApiResponse::ok(session, "Successfully signed in")))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user = run_blocking(&state, move |s| {
        UserService::new(&s.db, &s.mailer).verify_email(&token)
    })
    .await?;

    Ok(Json(ApiResponse::ok(user, "Email verified successfully")))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    run_blocking(&state, move |s| {
        UserService::new(&s.db, &s.mailer).delete_user(claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok((), "Successfully deleted the user")))
}
