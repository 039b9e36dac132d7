// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intake: turns inbound chat messages into queued tickets.

use std::collections::HashSet;
use std::sync::Arc;

use parley_config::model::{TelegramConfig, WorkflowConfig};
use parley_core::{
    ChannelAdapter, ConversationId, InboundMessage, ParleyError, StorageAdapter, Ticket,
    TicketId, TicketRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::Adapters;
use crate::registry::WorkerRegistry;
use crate::steps::lease_duration;

/// Reads the channel and opens a ticket for every authorized message.
///
/// Intake is best effort: if the placeholder cannot be sent or the ticket
/// cannot be stored, the message is dropped and the user has to resend.
pub struct Dispatcher {
    channel: Arc<dyn ChannelAdapter + Send + Sync>,
    storage: Arc<dyn StorageAdapter + Send + Sync>,
    registry: Arc<WorkerRegistry>,
    allowed_chats: HashSet<ConversationId>,
    placeholder_text: String,
    ticket_ttl: chrono::Duration,
}

impl Dispatcher {
    pub fn new(
        adapters: &Adapters,
        registry: Arc<WorkerRegistry>,
        telegram: &TelegramConfig,
        workflow: &WorkflowConfig,
    ) -> Self {
        Self {
            channel: adapters.channel.clone(),
            storage: adapters.storage.clone(),
            registry,
            allowed_chats: telegram
                .allowed_chat_ids
                .iter()
                .copied()
                .map(ConversationId)
                .collect(),
            placeholder_text: telegram.placeholder_text.clone(),
            ticket_ttl: lease_duration(workflow),
        }
    }

    /// An empty allow-list admits nobody.
    pub fn is_authorized(&self, conversation_id: ConversationId) -> bool {
        self.allowed_chats.contains(&conversation_id)
    }

    /// Runs intake until `cancel` fires or the channel closes.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ParleyError> {
        info!(
            allowed_chats = self.allowed_chats.len(),
            "dispatcher running"
        );

        loop {
            tokio::select! {
                msg = self.channel.receive() => {
                    match msg {
                        Ok(inbound) => {
                            let conversation_id = inbound.conversation_id;
                            let message_id = inbound.message_id;
                            if let Err(e) = self.handle_inbound(inbound).await {
                                error!(
                                    conversation_id = %conversation_id,
                                    message_id = %message_id,
                                    error = %e,
                                    "failed to open ticket, message dropped"
                                );
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "channel receive error");
                            // If the channel is closed, break out of the loop.
                            if e.to_string().contains("closed") {
                                break;
                            }
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping dispatcher");
                    break;
                }
            }
        }

        info!("dispatcher stopped");
        Ok(())
    }

    /// Opens a ticket for one inbound message.
    ///
    /// Returns `Ok(None)` when the conversation is not authorized.
    pub async fn handle_inbound(
        &self,
        inbound: InboundMessage,
    ) -> Result<Option<TicketId>, ParleyError> {
        let conversation_id = inbound.conversation_id;
        if !self.is_authorized(conversation_id) {
            debug!(conversation_id = %conversation_id, "ignoring unauthorized chat");
            return Ok(None);
        }

        if self.registry.ensure_worker(conversation_id) {
            info!(conversation_id = %conversation_id, "started conversation worker");
        }

        let placeholder_id = self
            .channel
            .send_reply(conversation_id, inbound.message_id, &self.placeholder_text)
            .await?;

        let ticket = Ticket::new(
            conversation_id,
            TicketRequest {
                text: inbound.text,
                message_id: inbound.message_id,
                attachment: inbound.attachment,
            },
            placeholder_id,
            self.ticket_ttl,
        );

        self.storage.put_ticket(&ticket).await?;
        self.storage
            .enqueue_pool(conversation_id, &ticket.id, ticket.priority())
            .await?;

        debug!(
            ticket_id = %ticket.id,
            conversation_id = %conversation_id,
            message_id = %ticket.request.message_id,
            "ticket opened"
        );

        #[cfg(feature = "prometheus")]
        parley_prometheus::record_ticket_created();

        Ok(Some(ticket.id))
    }
}
