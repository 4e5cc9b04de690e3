use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};

use tandem_chat::{ChatService, ConnectionHandle};
use tandem_types::events::ServerEvent;
use tandem_types::models::UserId;

use crate::GatewaySettings;
use crate::dispatcher::FrameDispatcher;

pub const WELCOME: &str = "connection established";

/// How long the writer gets to flush a close frame after the reader stops.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Drive a WebSocket whose token was already verified at the HTTP upgrade.
///
/// The reader runs here; a spawned writer drains the connection's outbound
/// queue and sends pings. Either side stopping closes the other, and the
/// connection leaves the session registry exactly once.
pub async fn handle_connection(
    socket: WebSocket,
    chat: ChatService,
    user_id: UserId,
    settings: GatewaySettings,
) {
    let (sender, mut receiver) = socket.split();

    let (handle, outbound_rx) = ConnectionHandle::new(settings.outbound_queue);
    let mut dispatcher = FrameDispatcher::new(chat, handle.clone());
    if !dispatcher.establish(user_id) {
        warn!("Could not register connection {} for user {}", handle.id(), user_id);
        return;
    }
    info!("User {} connected to gateway ({})", user_id, handle.id());

    if handle.try_deliver(ServerEvent::System(WELCOME.into())).is_err() {
        return;
    }

    // Shared heartbeat flag: the reader sets it on Pong, the writer checks it on each tick.
    let pong_received = Arc::new(AtomicBool::new(true));

    let mut send_task = tokio::spawn(write_loop(
        sender,
        outbound_rx,
        handle.clone(),
        pong_received.clone(),
        settings.heartbeat_interval,
    ));

    loop {
        tokio::select! {
            _ = handle.closed() => break,
            _ = &mut send_task => break,
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatcher.dispatch(text.as_str()).await,
                Some(Ok(Message::Binary(_))) => dispatcher.reject_binary().await,
                Some(Ok(Message::Pong(_))) => {
                    pong_received.store(true, Ordering::Relaxed);
                }
                Some(Ok(Message::Ping(_))) => {
                    // axum answers pings itself
                    trace!("Ping from user {}", user_id);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!("WebSocket error for user {}: {}", user_id, e);
                    break;
                }
            },
        }
    }

    dispatcher.close();
    if !send_task.is_finished() && tokio::time::timeout(WRITER_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }
    info!("User {} disconnected from gateway ({})", user_id, handle.id());
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerEvent>,
    handle: ConnectionHandle,
    pong_received: Arc<AtomicBool>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            _ = handle.closed() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = outbound_rx.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode frame for connection {}: {}", handle.id(), e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Relaxed) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Connection {} missed {} heartbeats, closing", handle.id(), missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Let the reader side know the socket is gone.
    handle.close();
}
