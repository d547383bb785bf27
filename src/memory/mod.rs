//! Conversation memory
//!
//! Per-session history consumed as model context and as the source for
//! slot backfill during negotiation.

pub mod store;

pub use store::{ConversationHistory, ConversationMessage, MessageRole};
