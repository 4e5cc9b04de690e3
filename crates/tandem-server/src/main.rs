use std::sync::Arc;

use tracing::info;

use tandem_chat::{ChatService, SessionRegistry};
use tandem_server::config::Config;
use tandem_server::{ServerState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let addr = config.addr()?;

    let db = Arc::new(tandem_db::Database::open(&config.db_path)?);
    info!("Opened database at {}", config.db_path.display());

    let chat = ChatService::new(db, SessionRegistry::new(), config.chat.clone());
    let app = build_router(ServerState {
        chat,
        gateway: config.gateway.clone(),
        jwt_secret: config.jwt_secret.clone(),
    });

    info!("Tandem server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
