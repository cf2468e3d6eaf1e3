//! Wire protocol and shared data model for the cowork agent server.
//!
//! This crate has no business logic: it is the contract `cowork-core` and
//! `cowork-server` speak to each other and to front-ends. Keeping it
//! dependency-light (serde/serde_json, chrono, uuid) means any transport
//! (here, an axum WebSocket) can depend on it without pulling in the turn
//! loop.

pub mod client_message;
pub mod error;
pub mod server_event;
pub mod session;

pub use client_message::ClientMessage;
pub use error::ErrorCode;
pub use error::ErrorSource;
pub use server_event::ServerEvent;
pub use server_event::ServerEventMsg;
pub use session::ContentPart;
pub use session::Message;
pub use session::MessageRole;
pub use session::ReasoningKind;
pub use session::SessionConfig;
pub use session::SessionStatus;
pub use session::TodoItem;
pub use session::TodoStatus;
