use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_types::api::{
    AddChannelRequest, AddMemberRequest, ApiResponse, Claims, CreateWorkspaceRequest,
    JoinWorkspaceRequest, UpdateWorkspaceRequest, WorkspacePostRequest,
};
use huddle_types::models::Workspace;

use crate::error::{ApiJson, ApiResult};
use crate::services::WorkspaceService;
use crate::state::{AppState, run_blocking};

pub async fn create_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).create_workspace(
            &req.name,
            &req.description,
            claims.sub,
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(workspace, "Workspace created successfully")),
    ))
}

pub async fn list_workspaces(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let workspaces = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).list_workspaces(claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspaces, "Successfully fetched all workspaces")))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).get_workspace(workspace_id, claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspace, "Workspace fetched successfully")))
}

pub async fn delete_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).delete_workspace(workspace_id, claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok((), "Successfully deleted the workspace")))
}

/// `POST /workspaces/{id}`: add a member when the body has `member_id`,
/// otherwise update name/description.
pub async fn post_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
    ApiJson(req): ApiJson<WorkspacePostRequest>,
) -> ApiResult<impl IntoResponse> {
    match req {
        WorkspacePostRequest::AddMember(add) => {
            add_member_inner(state, claims, workspace_id, add).await
        }
        WorkspacePostRequest::Update(update) => {
            update_inner(state, claims, workspace_id, update).await
        }
    }
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    add_member_inner(state, claims, workspace_id, req).await
}

async fn add_member_inner(
    state: AppState,
    claims: Claims,
    workspace_id: Uuid,
    req: AddMemberRequest,
) -> ApiResult<Json<ApiResponse<Workspace>>> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).add_member(
            workspace_id,
            req.member_id,
            req.role,
            claims.sub,
        )
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspace, "Successfully added member to workspace")))
}

async fn update_inner(
    state: AppState,
    claims: Claims,
    workspace_id: Uuid,
    req: UpdateWorkspaceRequest,
) -> ApiResult<Json<ApiResponse<Workspace>>> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).update_workspace(
            workspace_id,
            req.name,
            req.description,
            claims.sub,
        )
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspace, "Successfully updated the workspace")))
}

pub async fn add_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
    ApiJson(req): ApiJson<AddChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).add_channel(
            workspace_id,
            &req.channel_name,
            claims.sub,
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(workspace, "Successfully added channel to workspace")),
    ))
}

/// `GET /workspaces/{joinCode}/join`: look a workspace up by its join code.
pub async fn get_by_join_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(join_code): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).get_workspace_by_join_code(&join_code, claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspace, "Workspace fetched successfully")))
}

pub async fn join_workspace(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
    ApiJson(req): ApiJson<JoinWorkspaceRequest>,
) -> ApiResult<impl IntoResponse> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).join_by_code(
            workspace_id,
            &req.join_code,
            claims.sub,
        )
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspace, "Joined workspace successfully")))
}

pub async fn reset_join_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(workspace_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let workspace = run_blocking(&state, move |s| {
        WorkspaceService::new(&s.db, &s.mailer).reset_join_code(workspace_id, claims.sub)
    })
    .await?;

    Ok(Json(ApiResponse::ok(workspace, "Join code reset successfully")))
}
