use tracing::{debug, error, trace, warn};

use tandem_chat::{ChatError, ChatService, ConnectionHandle, ErrorKind};
use tandem_types::events::{AckData, ClientCommand, FrameError, HeartbeatData, HistoryRequest, ServerEvent};
use tandem_types::models::{ChatMessage, ConversationType, UserId};

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted at the transport level, not yet bound to a user
    Unauthenticated,
    /// Registered in the session registry and processing frames
    Established(UserId),
    /// Unregistered; every further frame is dropped
    Closed,
}

/// Routes inbound text frames of one connection to the chat core and queues
/// the direct replies. Frames are handled one at a time, in arrival order.
pub struct FrameDispatcher {
    chat: ChatService,
    connection: ConnectionHandle,
    state: ConnectionState,
}

impl FrameDispatcher {
    pub fn new(chat: ChatService, connection: ConnectionHandle) -> Self {
        Self {
            chat,
            connection,
            state: ConnectionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Bind the connection to an authenticated user and register it.
    /// Only valid from `Unauthenticated`.
    pub fn establish(&mut self, user_id: UserId) -> bool {
        if self.state != ConnectionState::Unauthenticated {
            return false;
        }
        if !self.chat.sessions().register(user_id, self.connection.clone()) {
            return false;
        }
        self.state = ConnectionState::Established(user_id);
        true
    }

    /// Unregister (once) and signal the connection's tasks to stop.
    pub fn close(&mut self) {
        if let ConnectionState::Established(user_id) = self.state {
            if self.chat.sessions().unregister(self.connection.id()).is_some() {
                debug!(user_id, connection_id = %self.connection.id(), "connection closed");
            }
        }
        self.state = ConnectionState::Closed;
        self.connection.close();
    }

    pub async fn dispatch(&mut self, text: &str) {
        let ConnectionState::Established(user_id) = self.state else {
            trace!("Dropping frame on connection in state {:?}", self.state);
            return;
        };

        // Evicted by fan-out: the registry no longer knows this connection.
        if self.chat.sessions().owner_of(self.connection.id()) != Some(user_id) {
            debug!("Dropping frame from evicted connection {}", self.connection.id());
            return;
        }

        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err(e) => {
                warn!("Bad frame from user {}: {}", user_id, e);
                let reason = match e {
                    FrameError::Malformed(_) => "malformed frame".to_string(),
                    FrameError::UnknownType(_) => e.to_string(),
                };
                self.reply(ServerEvent::Error(reason)).await;
                return;
            }
        };

        trace!(user_id, kind = command.kind(), "dispatching frame");

        let result = match command {
            ClientCommand::Chat(message) => self.on_chat(user_id, message).await,
            ClientCommand::Heartbeat(_) => {
                self.reply(ServerEvent::Heartbeat(HeartbeatData::now())).await;
                Ok(())
            }
            ClientCommand::Ack(ack) => self.on_ack(user_id, ack).await,
            ClientCommand::RequestHistory(request) => self.on_history(user_id, request).await,
        };

        if let Err(e) = result {
            match e.kind() {
                ErrorKind::Storage => error!("Request from user {} failed: {:#}", user_id, e),
                _ => debug!("Request from user {} declined: {}", user_id, e),
            }
            self.reply(ServerEvent::Error(e.client_message())).await;
        }
    }

    /// Binary frames carry nothing this protocol understands.
    pub async fn reject_binary(&self) {
        self.reply(ServerEvent::Error("binary frames are not supported".into()))
            .await;
    }

    async fn on_chat(&self, user_id: UserId, message: ChatMessage) -> Result<(), ChatError> {
        let chat = self.chat.clone();
        // The sender's own connections get the stored copy through fan-out.
        blocking(move || chat.submit(user_id, message)).await.map(|_| ())
    }

    async fn on_ack(&self, user_id: UserId, ack: AckData) -> Result<(), ChatError> {
        if ack.conversation_type != ConversationType::Private {
            return Err(ChatError::UnsupportedConversationType);
        }
        let chat = self.chat.clone();
        let outcome = blocking(move || {
            chat.acknowledge(user_id, ack.conversation_id, ack.last_message_id)
        })
        .await?;
        trace!(
            "User {} read conversation {} up to {}",
            user_id, ack.conversation_id, outcome.last_read_message_id
        );
        Ok(())
    }

    async fn on_history(&self, user_id: UserId, request: HistoryRequest) -> Result<(), ChatError> {
        if request.conversation_type != ConversationType::Private {
            return Err(ChatError::UnsupportedConversationType);
        }
        let chat = self.chat.clone();
        let page = blocking(move || {
            chat.history(user_id, request.conversation_id, request.last_message_id, None)
        })
        .await?;
        self.reply(ServerEvent::RequestHistory(page)).await;
        Ok(())
    }

    async fn reply(&self, event: ServerEvent) {
        if let Err(e) = self.connection.reply(event).await {
            debug!("Reply to connection {} dropped: {}", self.connection.id(), e);
        }
    }
}

impl Drop for FrameDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run a chat-core call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ChatError>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {e}")))?
}
