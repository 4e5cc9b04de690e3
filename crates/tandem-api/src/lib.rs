pub mod chats;
pub mod friends;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    http::StatusCode,
    routing::{delete, get, post},
};
use tracing::error;

use tandem_chat::{ChatError, ChatService, ErrorKind};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub chat: ChatService,
    pub jwt_secret: String,
}

/// REST routes. Every route requires a bearer token.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chats", get(chats::list_chats))
        .route("/friends/accept", post(friends::accept_friend_request))
        .route("/friends/{user_id}", delete(friends::delete_friend))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}

pub(crate) fn status_for(err: &ChatError) -> StatusCode {
    match err.kind() {
        ErrorKind::Admission => StatusCode::FORBIDDEN,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage => {
            error!("{:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run a chat-core call off the async runtime and map its error to a status.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| status_for(&e))
}
