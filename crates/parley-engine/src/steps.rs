// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The four step handlers of the ticket state machine.
//!
//! Every handler opens the same way: load the ticket, require
//! `status == New` and the handler's own action, then persist the claim
//! (`InProgress`, or `WaitingForResponse` for the AI step) before any
//! externally visible work. A handler that fails after the claim leaves
//! the ticket at its last persisted state.

use chrono::Duration;
use parley_config::model::WorkflowConfig;
use parley_core::{
    ChatMessage, CompletionRequest, CompletionResponse, ConversationId, ParleyError, Ticket,
    TicketAction, TicketId, TicketStatus, recent_window,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::Adapters;

/// What became of a ticket after its AI call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiDisposition {
    /// The answer was recorded and the ticket queued for delivery.
    Answered,
    /// The call failed; the ticket is queued to try the same step again.
    Retrying { retry_count: u32 },
    /// The call failed for the last allowed time; the ticket is now `Error`.
    Abandoned { retry_count: u32 },
}

/// Step handlers bound to a single conversation.
///
/// Only [`validate`](Self::validate) and [`send_reply`](Self::send_reply)
/// take the conversation lock: they are the only steps that read or write
/// the conversation watermark. `collect_context` and the AI step touch
/// ticket-local state only and run without it.
pub struct StepHandlers {
    conversation_id: ConversationId,
    adapters: Adapters,
    watermark_lock: Mutex<()>,
    ticket_ttl: Duration,
    context_window: usize,
    max_ai_retries: u32,
}

impl StepHandlers {
    pub fn new(
        conversation_id: ConversationId,
        adapters: Adapters,
        workflow: &WorkflowConfig,
    ) -> Self {
        Self {
            conversation_id,
            adapters,
            watermark_lock: Mutex::new(()),
            ticket_ttl: lease_duration(workflow),
            context_window: workflow.context_window,
            max_ai_retries: workflow.max_ai_retries,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    /// Loads a ticket of this conversation, lifting absence into `NotFound`.
    pub async fn load(&self, ticket_id: &TicketId) -> Result<Ticket, ParleyError> {
        let ticket = self
            .adapters
            .storage
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound {
                entity: "ticket",
                key: ticket_id.to_string(),
            })?;

        if ticket.conversation_id != self.conversation_id {
            return Err(ParleyError::Internal(format!(
                "ticket {ticket_id} belongs to conversation {}, not {}",
                ticket.conversation_id, self.conversation_id
            )));
        }
        Ok(ticket)
    }

    /// Opening protocol shared by all handlers.
    async fn claim(
        &self,
        ticket_id: &TicketId,
        action: TicketAction,
        claimed: TicketStatus,
    ) -> Result<Ticket, ParleyError> {
        let mut ticket = self.load(ticket_id).await?;

        if ticket.status != TicketStatus::New {
            return Err(ParleyError::InvalidState {
                ticket_id: ticket.id,
                expected: TicketStatus::New,
                actual: ticket.status,
            });
        }
        if ticket.action != action {
            return Err(ParleyError::InvalidAction {
                ticket_id: ticket.id,
                expected: action,
                actual: ticket.action,
            });
        }

        ticket.transition(claimed, self.ticket_ttl);
        self.adapters.storage.put_ticket(&ticket).await?;
        debug!(
            ticket_id = %ticket.id,
            action = %action,
            status = %claimed,
            "ticket claimed"
        );
        Ok(ticket)
    }

    /// Persists the ticket and puts it back into the pool.
    async fn requeue(&self, ticket: &Ticket) -> Result<(), ParleyError> {
        self.adapters.storage.put_ticket(ticket).await?;
        self.adapters
            .storage
            .enqueue_pool(self.conversation_id, &ticket.id, ticket.priority())
            .await
    }

    /// Checks the ticket against the conversation watermark.
    ///
    /// A ticket older than the watermark is put back unchanged (still
    /// `Validate`) and [`ParleyError::Stale`] is returned. An unset
    /// watermark admits every ticket. The pool pops lowest first, so a stale
    /// ticket at the head holds back later tickets until the watermark drops
    /// to its message id.
    pub async fn validate(&self, ticket_id: &TicketId) -> Result<(), ParleyError> {
        let _guard = self.watermark_lock.lock().await;
        let mut ticket = self
            .claim(ticket_id, TicketAction::Validate, TicketStatus::InProgress)
            .await?;

        let watermark = self
            .adapters
            .storage
            .get_watermark(self.conversation_id)
            .await?;

        if let Some(watermark) = watermark
            && ticket.request.message_id < watermark
        {
            ticket.transition(TicketStatus::New, self.ticket_ttl);
            self.requeue(&ticket).await?;

            #[cfg(feature = "prometheus")]
            parley_prometheus::record_stale_deferral();

            return Err(ParleyError::Stale {
                ticket_id: ticket.id,
                message_id: ticket.request.message_id,
                watermark,
            });
        }

        ticket.advance(self.ticket_ttl)?;
        self.requeue(&ticket).await
    }

    /// Builds the AI context window from the stored history plus the request.
    pub async fn collect_context(&self, ticket_id: &TicketId) -> Result<(), ParleyError> {
        let mut ticket = self
            .claim(
                ticket_id,
                TicketAction::CollectContext,
                TicketStatus::InProgress,
            )
            .await?;

        let mut history = self
            .adapters
            .storage
            .get_history(self.conversation_id)
            .await?
            .unwrap_or_default();
        history.push(ChatMessage::user(ticket.request.text.clone()));

        ticket.chat_context = recent_window(history, self.context_window);
        debug!(
            ticket_id = %ticket.id,
            entries = ticket.chat_context.len(),
            "context collected"
        );

        ticket.advance(self.ticket_ttl)?;
        self.requeue(&ticket).await
    }

    /// Claims the ticket for its AI call and returns the request to send.
    ///
    /// The call itself is made by the caller; its result goes to
    /// [`finish_ai_request`](Self::finish_ai_request).
    pub async fn begin_ai_request(
        &self,
        ticket_id: &TicketId,
    ) -> Result<CompletionRequest, ParleyError> {
        let ticket = self
            .claim(
                ticket_id,
                TicketAction::SendAiRequest,
                TicketStatus::WaitingForResponse,
            )
            .await?;

        Ok(CompletionRequest {
            conversation_id: Some(self.conversation_id),
            messages: ticket.chat_context,
            system_prompt: None,
        })
    }

    /// Applies the outcome of an AI call to a `WaitingForResponse` ticket.
    ///
    /// Failures bump `retry_count` first; reaching `max_ai_retries` makes the
    /// ticket terminal (`Error`, not re-enqueued).
    pub async fn finish_ai_request(
        &self,
        ticket_id: &TicketId,
        outcome: Result<CompletionResponse, ParleyError>,
    ) -> Result<AiDisposition, ParleyError> {
        let mut ticket = self.load(ticket_id).await?;

        if ticket.status != TicketStatus::WaitingForResponse {
            return Err(ParleyError::InvalidState {
                ticket_id: ticket.id,
                expected: TicketStatus::WaitingForResponse,
                actual: ticket.status,
            });
        }
        if ticket.action != TicketAction::SendAiRequest {
            return Err(ParleyError::InvalidAction {
                ticket_id: ticket.id,
                expected: TicketAction::SendAiRequest,
                actual: ticket.action,
            });
        }

        match outcome {
            Ok(response) => {
                ticket
                    .chat_context
                    .push(ChatMessage::assistant(response.text.clone()));
                ticket.response.text = response.text;
                ticket.error = None;
                ticket.advance(self.ticket_ttl)?;
                self.requeue(&ticket).await?;
                debug!(ticket_id = %ticket.id, model = %response.model, "AI answer recorded");
                Ok(AiDisposition::Answered)
            }
            Err(e) => {
                ticket.retry_count += 1;
                ticket.error = Some(e.to_string());
                let retry_count = ticket.retry_count;

                if retry_count >= self.max_ai_retries {
                    ticket.transition(TicketStatus::Error, self.ticket_ttl);
                    self.adapters.storage.put_ticket(&ticket).await?;
                    error!(
                        ticket_id = %ticket.id,
                        conversation_id = %self.conversation_id,
                        retry_count,
                        error = %e,
                        "AI request failed, ticket abandoned"
                    );

                    #[cfg(feature = "prometheus")]
                    parley_prometheus::record_ticket_failed();

                    Ok(AiDisposition::Abandoned { retry_count })
                } else {
                    ticket.transition(TicketStatus::New, self.ticket_ttl);
                    self.requeue(&ticket).await?;
                    warn!(
                        ticket_id = %ticket.id,
                        retry_count,
                        error = %e,
                        "AI request failed, will retry"
                    );

                    #[cfg(feature = "prometheus")]
                    parley_prometheus::record_ai_retry();

                    Ok(AiDisposition::Retrying { retry_count })
                }
            }
        }
    }

    /// Runs the whole AI step inline: claim, call, apply.
    pub async fn send_ai_request(
        &self,
        ticket_id: &TicketId,
    ) -> Result<AiDisposition, ParleyError> {
        let request = self.begin_ai_request(ticket_id).await?;
        let outcome = self.adapters.provider.complete(request).await;
        self.finish_ai_request(ticket_id, outcome).await
    }

    /// Delivers the answer and retires the ticket.
    ///
    /// The ticket's context becomes the conversation history. The new
    /// watermark is the lowest priority still pooled, or the request's
    /// message id + 1 when the pool is empty; it may therefore move
    /// backwards. A failed edit is logged and does not stop delivery.
    pub async fn send_reply(&self, ticket_id: &TicketId) -> Result<(), ParleyError> {
        let _guard = self.watermark_lock.lock().await;
        let ticket = self
            .claim(ticket_id, TicketAction::SendReply, TicketStatus::InProgress)
            .await?;

        let storage = &self.adapters.storage;
        storage
            .put_history(self.conversation_id, &ticket.chat_context)
            .await?;

        let watermark = storage
            .peek_min_priority(self.conversation_id)
            .await?
            .unwrap_or_else(|| ticket.request.message_id.next());
        storage
            .set_watermark(self.conversation_id, watermark)
            .await?;

        if let Err(e) = self
            .adapters
            .channel
            .edit_message(
                self.conversation_id,
                ticket.response.message_id,
                &ticket.response.text,
            )
            .await
        {
            warn!(
                ticket_id = %ticket.id,
                message_id = %ticket.response.message_id,
                error = %e,
                "failed to edit placeholder reply"
            );
        }

        storage.delete_ticket(&ticket.id).await?;
        info!(
            ticket_id = %ticket.id,
            conversation_id = %self.conversation_id,
            watermark = %watermark,
            "reply delivered"
        );

        #[cfg(feature = "prometheus")]
        parley_prometheus::record_ticket_completed();

        Ok(())
    }
}

/// Ticket lease length as a chrono duration.
pub(crate) fn lease_duration(workflow: &WorkflowConfig) -> Duration {
    Duration::from_std(workflow.ticket_ttl()).unwrap_or(Duration::MAX)
}
