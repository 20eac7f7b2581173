//! Conversation and message domain.
//!
//! Durable two-participant conversations with an append-only message log.
//! The conversation row carries a denormalized last-message summary so
//! listing views never join against the log.

mod error;
mod models;
mod repository;
mod service;

pub use error::ChatError;
pub use models::{
    Conversation, ConversationView, LastMessage, Message, MessageView, NewMessage,
};
pub use repository::ChatRepository;
pub use service::{ChatService, SendOutcome};
