pub mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use tandem_api::AppStateInner;
use tandem_chat::ChatService;
use tandem_gateway::auth::verify_token;
use tandem_gateway::{GatewaySettings, connection};

#[derive(Clone)]
pub struct ServerState {
    pub chat: ChatService,
    pub gateway: GatewaySettings,
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

/// REST routes plus the `/ws` gateway upgrade.
pub fn build_router(state: ServerState) -> Router {
    let api = tandem_api::router(Arc::new(AppStateInner {
        chat: state.chat.clone(),
        jwt_secret: state.jwt_secret.clone(),
    }));

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// The token is checked before the upgrade; a bad one never gets a socket.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = query
        .token
        .as_deref()
        .and_then(|token| verify_token(&state.jwt_secret, token))
    else {
        warn!("Rejected gateway upgrade with missing or invalid token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.chat, claims.sub, state.gateway)
    })
}
