// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait: tickets, per-conversation pools, history and watermarks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ParleyError;
use crate::ticket::Ticket;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ChatMessage, ConversationId, MessageId, TicketId};

/// Adapter for the persistent store backing the workflow.
///
/// Every operation is atomic on its own key. `dequeue_pool` must remove the
/// member it returns in the same atomic step so that two workers can never
/// claim the same ticket. Absent entries are `Ok(None)`, never an error.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connections).
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), ParleyError>;

    // --- Tickets ---

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, ParleyError>;

    /// Inserts or overwrites a ticket.
    async fn put_ticket(&self, ticket: &Ticket) -> Result<(), ParleyError>;

    /// Deletes a ticket. Deleting a missing ticket is not an error.
    async fn delete_ticket(&self, id: &TicketId) -> Result<(), ParleyError>;

    /// Lists tickets whose lease ended at or before `now`.
    async fn list_expired_tickets(&self, now: DateTime<Utc>)
    -> Result<Vec<TicketId>, ParleyError>;

    // --- Pool ---

    /// Adds a ticket to the conversation's pool. Re-adding updates its priority.
    async fn enqueue_pool(
        &self,
        conversation_id: ConversationId,
        ticket_id: &TicketId,
        priority: MessageId,
    ) -> Result<(), ParleyError>;

    /// Atomically removes and returns the lowest-priority ticket.
    async fn dequeue_pool(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<TicketId>, ParleyError>;

    /// Lowest priority still pending, without removing it.
    async fn peek_min_priority(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, ParleyError>;

    async fn pool_len(&self, conversation_id: ConversationId) -> Result<usize, ParleyError>;

    // --- Conversation history ---

    async fn get_history(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Vec<ChatMessage>>, ParleyError>;

    /// Replaces the conversation's history.
    async fn put_history(
        &self,
        conversation_id: ConversationId,
        messages: &[ChatMessage],
    ) -> Result<(), ParleyError>;

    async fn get_watermark(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, ParleyError>;

    async fn set_watermark(
        &self,
        conversation_id: ConversationId,
        watermark: MessageId,
    ) -> Result<(), ParleyError>;
}
