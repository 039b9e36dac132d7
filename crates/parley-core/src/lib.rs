// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley ticket relay.
//!
//! This crate provides the ticket data model, the error taxonomy, and the
//! adapter traits for the three external collaborators: the chat platform,
//! the AI completion service, and the persistent store. It performs no I/O.

pub mod error;
pub mod ticket;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use ticket::{Ticket, TicketAction, TicketRequest, TicketResponse, TicketStatus, recent_window};
pub use types::{
    AdapterType, AttachmentRef, Author, ChatMessage, CompletionRequest, CompletionResponse,
    ConversationId, HealthStatus, InboundMessage, MessageId, TicketId, TokenUsage,
};

pub use traits::{ChannelAdapter, PluginAdapter, ProviderAdapter, StorageAdapter};
