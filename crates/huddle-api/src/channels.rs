use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_types::api::{ApiResponse, Claims, PageQuery, SendMessageRequest};

use crate::error::{ApiJson, ApiResult};
use crate::services::ChannelService;
use crate::state::{AppState, run_blocking};

pub async fn get_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let detail = run_blocking(&state, move |s| {
        ChannelService::new(&s.db, &s.dispatcher).get_channel(channel_id, claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok(detail, "Channel fetched successfully")))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let messages = run_blocking(&state, move |s| {
        ChannelService::new(&s.db, &s.dispatcher).list_messages(
            channel_id,
            claims.sub,
            page.page,
            page.limit,
        )
    })
    .await?;

    Ok(Json(ApiResponse::ok(messages, "Messages fetched successfully")))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = run_blocking(&state, move |s| {
        ChannelService::new(&s.db, &s.dispatcher).send_message(
            channel_id,
            claims.sub,
            &req.body,
            req.image,
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(message, "Message sent successfully")),
    ))
}
