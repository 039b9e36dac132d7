// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley ticket relay.

use thiserror::Error;

use crate::ticket::{TicketAction, TicketStatus};
use crate::types::{MessageId, TicketId};

/// The primary error type used across all Parley adapter traits and workflow steps.
///
/// Variants fall into the workflow taxonomy:
/// - `NotFound`: a store entry the caller required is absent.
/// - `InvalidState` / `InvalidAction`: a step handler's guard rejected the ticket.
///   These abort the step before any side effect.
/// - `Stale`: validation deferred an out-of-order ticket back into the pool.
/// - `Channel` / `Provider`: the chat platform or the AI service failed.
/// - `Storage`: persistence failed; the current step is aborted without partial commit.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// A required store entry is missing.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The ticket is not in the status the step handler requires.
    #[error("ticket {ticket_id} has status {actual}, expected {expected}")]
    InvalidState {
        ticket_id: TicketId,
        expected: TicketStatus,
        actual: TicketStatus,
    },

    /// The ticket's pending action does not belong to the step handler.
    #[error("ticket {ticket_id} has action {actual}, expected {expected}")]
    InvalidAction {
        ticket_id: TicketId,
        expected: TicketAction,
        actual: TicketAction,
    },

    /// The ticket is older than the conversation watermark and was re-enqueued.
    #[error("ticket {ticket_id} (message {message_id}) is behind watermark {watermark}")]
    Stale {
        ticket_id: TicketId,
        message_id: MessageId,
        watermark: MessageId,
    },

    /// Chat platform errors (send, edit, download, connection).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI provider errors (HTTP failure, malformed response, empty completion).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing credentials).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Builds a storage error from any boxed-compatible source.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ParleyError::Storage {
            source: source.into(),
        }
    }

    /// True for the handler-local guard failures (`InvalidState`, `InvalidAction`).
    pub fn is_guard_violation(&self) -> bool {
        matches!(
            self,
            ParleyError::InvalidState { .. } | ParleyError::InvalidAction { .. }
        )
    }

    /// True when an external collaborator (chat platform or AI service) failed.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            ParleyError::Channel { .. } | ParleyError::Provider { .. }
        )
    }

    /// True when validation deferred the ticket.
    pub fn is_stale(&self) -> bool {
        matches!(self, ParleyError::Stale { .. })
    }

    /// True when a required store entry is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ParleyError::NotFound { .. })
    }
}
