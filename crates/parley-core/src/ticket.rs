// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ticket: one user request moving through the four-stage pipeline.
//!
//! ```text
//! Validate -> CollectContext -> SendAiRequest -> SendReply -> (deleted)
//! ```
//!
//! A live ticket rests in exactly one of `New`, `InProgress` or
//! `WaitingForResponse`. `Error` is terminal; `Done` is never persisted
//! because successful tickets are deleted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;
use crate::types::{AttachmentRef, ChatMessage, ConversationId, MessageId, TicketId};

/// Lifecycle status of a ticket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum TicketStatus {
    /// Ready for the step named by its action.
    New,
    /// Claimed by a step handler.
    InProgress,
    /// Claimed by the AI step while the completion call is in flight.
    WaitingForResponse,
    /// Delivered. Never persisted; the ticket is deleted instead.
    Done,
    /// Terminal failure, abandoned.
    Error,
}

impl TicketStatus {
    /// True for `Done` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Done | TicketStatus::Error)
    }
}

/// The pipeline step a ticket is waiting for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum TicketAction {
    Validate,
    CollectContext,
    SendAiRequest,
    SendReply,
}

impl TicketAction {
    /// The step after this one, or `None` after `SendReply`.
    pub fn next(self) -> Option<TicketAction> {
        match self {
            TicketAction::Validate => Some(TicketAction::CollectContext),
            TicketAction::CollectContext => Some(TicketAction::SendAiRequest),
            TicketAction::SendAiRequest => Some(TicketAction::SendReply),
            TicketAction::SendReply => None,
        }
    }
}

/// The inbound side of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub text: String,
    /// Originating message id; causality key and pool priority.
    pub message_id: MessageId,
    pub attachment: Option<AttachmentRef>,
}

/// The outbound side of a ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketResponse {
    pub text: String,
    /// Id of the placeholder reply sent at intake, edited on delivery.
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub conversation_id: ConversationId,
    pub status: TicketStatus,
    pub action: TicketAction,
    pub request: TicketRequest,
    pub response: TicketResponse,
    pub chat_context: Vec<ChatMessage>,
    pub retry_count: u32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a fresh `New + Validate` ticket for an inbound request.
    pub fn new(
        conversation_id: ConversationId,
        request: TicketRequest,
        placeholder_id: MessageId,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TicketId::generate(),
            conversation_id,
            status: TicketStatus::New,
            action: TicketAction::Validate,
            request,
            response: TicketResponse {
                text: String::new(),
                message_id: placeholder_id,
            },
            chat_context: Vec::new(),
            retry_count: 0,
            error: None,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    /// Pool priority of this ticket.
    pub fn priority(&self) -> MessageId {
        self.request.message_id
    }

    /// Refreshes `updated_at` and pushes the lease out to now + `ttl`.
    pub fn touch(&mut self, ttl: Duration) {
        let now = Utc::now();
        self.updated_at = now;
        self.expires_at = now + ttl;
    }

    /// Sets the status and refreshes the lease.
    pub fn transition(&mut self, status: TicketStatus, ttl: Duration) {
        self.status = status;
        self.touch(ttl);
    }

    /// Moves to the next action and back to `New`.
    ///
    /// Fails on `SendReply`, which has no successor.
    pub fn advance(&mut self, ttl: Duration) -> Result<TicketAction, ParleyError> {
        let next = self.action.next().ok_or_else(|| {
            ParleyError::Internal(format!("ticket {} has no step after {}", self.id, self.action))
        })?;
        self.action = next;
        self.transition(TicketStatus::New, ttl);
        Ok(next)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Keeps only the most recent `window` entries of a conversation log.
pub fn recent_window(mut messages: Vec<ChatMessage>, window: usize) -> Vec<ChatMessage> {
    if messages.len() > window {
        messages.drain(..messages.len() - window);
    }
    messages
}
