use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{channels, dms, users, workspaces};

/// The REST surface. The websocket gateway is mounted by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/users/signup", post(users::sign_up))
        .route("/users/signin", post(users::sign_in))
        .route("/verify/{token}", get(users::verify_email));

    let protected_routes = Router::new()
        .route("/users/me", delete(users::delete_me))
        .route(
            "/workspaces",
            post(workspaces::create_workspace).get(workspaces::list_workspaces),
        )
        .route(
            "/workspaces/{id}",
            get(workspaces::get_workspace)
                .delete(workspaces::delete_workspace)
                .post(workspaces::post_workspace),
        )
        .route(
            "/workspaces/{id}/channels",
            post(workspaces::add_channel).put(workspaces::add_channel),
        )
        .route("/workspaces/{id}/members", put(workspaces::add_member))
        .route(
            "/workspaces/{id}/join",
            get(workspaces::get_by_join_code).put(workspaces::join_workspace),
        )
        .route("/workspaces/{id}/join-code/reset", put(workspaces::reset_join_code))
        .route("/dms/start", post(dms::start_dm))
        .route("/dms/workspace/{id}", get(dms::list_dms))
        .route("/dms/{id}", get(dms::get_dm))
        .route("/dms/{id}/message", post(dms::send_message))
        .route("/channels/{id}", get(channels::get_channel))
        .route(
            "/channels/{id}/messages",
            get(channels::list_messages).post(channels::send_message),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
