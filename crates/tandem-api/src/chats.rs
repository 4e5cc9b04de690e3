use axum::{Extension, Json, extract::State, http::StatusCode};

use tandem_types::api::{ChatListResponse, Claims};

use crate::{AppState, blocking};

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ChatListResponse>, StatusCode> {
    let chat = state.chat.clone();
    let chats = blocking(move || chat.chat_list(claims.sub)).await?;
    Ok(Json(ChatListResponse { chats }))
}
