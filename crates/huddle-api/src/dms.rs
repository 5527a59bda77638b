use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_types::api::{ApiResponse, Claims, SendMessageRequest, StartDmRequest};

use crate::error::{ApiJson, ApiResult};
use crate::services::DmService;
use crate::state::{AppState, run_blocking};

/// 201 when the room was created by this call, 200 when it already existed.
pub async fn start_dm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<StartDmRequest>,
) -> ApiResult<impl IntoResponse> {
    let started = run_blocking(&state, move |s| {
        DmService::new(&s.db, &s.dispatcher).start_dm(
            claims.sub,
            req.recipient_id,
            req.workspace_id,
        )
    })
    .await?;

    let (status, message) = if started.is_new {
        (StatusCode::CREATED, "DM room created successfully")
    } else {
        (StatusCode::OK, "DM room already exists")
    };
    Ok((status, Json(ApiResponse::ok(started.room, message))))
}

pub async fn list_dms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let rooms = run_blocking(&state, move |s| {
        DmService::new(&s.db, &s.dispatcher).get_all_dms(claims.sub, workspace_id)
    })
    .await?;

    Ok(Json(ApiResponse::ok(rooms, "DMs fetched successfully")))
}

pub async fn get_dm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = run_blocking(&state, move |s| {
        DmService::new(&s.db, &s.dispatcher).get_dm_by_id(room_id, claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok(detail, "DM fetched successfully")))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = run_blocking(&state, move |s| {
        DmService::new(&s.db, &s.dispatcher).send_message(room_id, claims.sub, &req.body, req.image)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(message, "Message sent successfully")),
    ))
}
