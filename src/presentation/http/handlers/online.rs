//! Online Presence Handlers
//!
//! # Endpoints
//! - `GET /ws/online` - Users online anywhere in the fleet
//! - `GET /ws/online/{user_id}` - Whether one user is online

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserOnlineResponse {
    pub user_id: String,
    pub online: bool,
}

/// List online users, sorted by id.
pub async fn list_online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    let users = state.hub.online_users().await.into_iter().collect();
    Json(OnlineUsersResponse { users })
}

pub async fn user_online(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserOnlineResponse> {
    let online = state.hub.is_user_online(&user_id).await;
    Json(UserOnlineResponse { user_id, online })
}
