use thiserror::Error;

/// Coarse classification used for logging and for mapping onto transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller may not do this (spoofed sender, not friends, not a member)
    Admission,
    /// The request itself is malformed or unsupported
    Validation,
    /// A referenced user, conversation, message or relation does not exist
    NotFound,
    /// Storage failed; nothing was written
    Storage,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message sender does not match the connected user")]
    SenderMismatch,
    #[error("you are not friends yet, send a friend request first")]
    NotFriends,
    #[error("you are not a member of this conversation")]
    NotAMember,

    #[error("conversation not found")]
    ConversationNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("no friend request from this user")]
    FriendRequestNotFound,
    #[error("you are not friends with this user")]
    FriendshipNotFound,

    #[error("conversation does not belong to these users")]
    ConversationMismatch,
    #[error("message does not belong to this conversation")]
    MessageNotInConversation,
    #[error("cannot address yourself")]
    SelfAddressed,
    #[error("unsupported conversation type")]
    UnsupportedConversationType,
    #[error("invalid message content: {0}")]
    InvalidContent(String),
    #[error("reply target is not a message in this conversation")]
    InvalidReply,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SenderMismatch | Self::NotFriends | Self::NotAMember => ErrorKind::Admission,
            Self::ConversationNotFound
            | Self::MessageNotFound
            | Self::UserNotFound
            | Self::FriendRequestNotFound
            | Self::FriendshipNotFound => ErrorKind::NotFound,
            Self::ConversationMismatch
            | Self::MessageNotInConversation
            | Self::SelfAddressed
            | Self::UnsupportedConversationType
            | Self::InvalidContent(_)
            | Self::InvalidReply => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Reason string safe to send back to a client. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Storage => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
