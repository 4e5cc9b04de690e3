//! Private messaging core: who is online, who may talk to whom, and the
//! path a message takes from one socket to storage and back out to every
//! connection of both parties.

pub mod ack;
pub mod conversation;
pub mod error;
pub mod friends;
pub mod history;
pub mod pipeline;
pub mod registry;
pub mod service;

pub use error::{ChatError, ErrorKind};
pub use registry::{ConnectionHandle, ConnectionId, DeliveryError, SessionRegistry};
pub use service::{ChatService, ChatSettings, FriendAcceptance};
