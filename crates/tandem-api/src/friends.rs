use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use tandem_chat::FriendAcceptance;
use tandem_types::api::{AcceptFriendRequest, Claims};
use tandem_types::models::UserId;

use crate::{AppState, blocking};

/// Accept every pending friend request the caller received from `originUserId`.
pub async fn accept_friend_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AcceptFriendRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let chat = state.chat.clone();
    let outcome =
        blocking(move || chat.accept_friend_request(claims.sub, req.origin_user_id)).await?;

    let body = match outcome {
        FriendAcceptance::AlreadyFriends => json!({ "accepted": true, "alreadyFriends": true }),
        FriendAcceptance::Accepted { greeting } => json!({
            "accepted": true,
            "alreadyFriends": false,
            "greeting": greeting,
        }),
    };
    Ok(Json(body))
}

pub async fn delete_friend(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, StatusCode> {
    let chat = state.chat.clone();
    blocking(move || chat.delete_friend(claims.sub, user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
