// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation worker loop.
//!
//! The worker pops the lowest-priority ticket from its conversation's pool
//! and runs the step named by the ticket's action. AI calls run as tracked
//! background tasks; their results come back as [`WorkerEvent`]s and are
//! applied inside the loop, so every ticket mutation of a conversation
//! happens on its worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_config::model::WorkflowConfig;
use parley_core::{
    CompletionRequest, CompletionResponse, ConversationId, ParleyError, TicketAction, TicketId,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::Adapters;
use crate::steps::StepHandlers;

/// Messages fed back into a worker by its background tasks.
#[derive(Debug)]
pub enum WorkerEvent {
    AiCompleted {
        ticket_id: TicketId,
        outcome: Result<CompletionResponse, ParleyError>,
    },
}

/// Result of one worker iteration that found a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step finished and the ticket was queued for its next action.
    Advanced {
        ticket_id: TicketId,
        completed: TicketAction,
    },
    /// Validation found the ticket behind the watermark and put it back.
    Deferred { ticket_id: TicketId },
    /// The ticket was claimed and its AI call started in the background.
    AiDispatched { ticket_id: TicketId },
    /// The reply was delivered and the ticket deleted.
    Delivered { ticket_id: TicketId },
}

/// Worker for a single conversation.
pub struct ConversationWorker {
    steps: Arc<StepHandlers>,
    events_tx: mpsc::UnboundedSender<WorkerEvent>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    ai_tasks: TaskTracker,
    idle_poll: Duration,
    step_backoff: Duration,
}

impl ConversationWorker {
    pub fn new(
        conversation_id: ConversationId,
        adapters: Adapters,
        workflow: &WorkflowConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            steps: Arc::new(StepHandlers::new(conversation_id, adapters, workflow)),
            events_tx,
            events_rx,
            ai_tasks: TaskTracker::new(),
            idle_poll: workflow.idle_poll(),
            step_backoff: workflow.step_backoff(),
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.steps.conversation_id()
    }

    pub fn steps(&self) -> &StepHandlers {
        &self.steps
    }

    /// Number of AI calls still running.
    pub fn in_flight(&self) -> usize {
        self.ai_tasks.len()
    }

    /// Runs until `cancel` fires, then waits for in-flight AI calls and
    /// applies their results before returning.
    pub async fn run(mut self, cancel: CancellationToken) {
        let conversation_id = self.conversation_id();
        info!(conversation_id = %conversation_id, "conversation worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let delay = match self.step().await {
                Ok(Some(StepOutcome::Deferred { .. })) | Ok(None) => self.idle_poll,
                Ok(Some(_)) => self.step_backoff,
                Err(e) => {
                    log_step_error(conversation_id, &e);
                    self.step_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(event) = self.events_rx.recv() => self.apply(event).await,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(
            conversation_id = %conversation_id,
            in_flight = self.in_flight(),
            "worker draining"
        );
        self.settle().await;
        info!(conversation_id = %conversation_id, "conversation worker stopped");
    }

    /// Applies any AI results that are ready, then handles at most one
    /// ticket from the pool. Returns `Ok(None)` when the pool is empty.
    pub async fn step(&mut self) -> Result<Option<StepOutcome>, ParleyError> {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event).await;
        }

        let conversation_id = self.conversation_id();
        let Some(ticket_id) = self
            .steps
            .adapters()
            .storage
            .dequeue_pool(conversation_id)
            .await?
        else {
            return Ok(None);
        };

        let ticket = self.steps.load(&ticket_id).await?;
        debug!(
            ticket_id = %ticket_id,
            action = %ticket.action,
            status = %ticket.status,
            "dequeued ticket"
        );

        let result = match ticket.action {
            TicketAction::Validate => self.steps.validate(&ticket_id).await.map(|()| {
                StepOutcome::Advanced {
                    ticket_id: ticket_id.clone(),
                    completed: TicketAction::Validate,
                }
            }),
            TicketAction::CollectContext => {
                self.steps.collect_context(&ticket_id).await.map(|()| {
                    StepOutcome::Advanced {
                        ticket_id: ticket_id.clone(),
                        completed: TicketAction::CollectContext,
                    }
                })
            }
            TicketAction::SendAiRequest => {
                match self.steps.begin_ai_request(&ticket_id).await {
                    Ok(request) => {
                        self.spawn_ai_call(ticket_id.clone(), request);
                        Ok(StepOutcome::AiDispatched {
                            ticket_id: ticket_id.clone(),
                        })
                    }
                    Err(e) => Err(e),
                }
            }
            TicketAction::SendReply => self.steps.send_reply(&ticket_id).await.map(|()| {
                StepOutcome::Delivered {
                    ticket_id: ticket_id.clone(),
                }
            }),
        };

        match result {
            Err(e) if e.is_stale() => {
                debug!(ticket_id = %ticket_id, reason = %e, "ticket deferred");
                Ok(Some(StepOutcome::Deferred { ticket_id }))
            }
            Err(e) => {
                #[cfg(feature = "prometheus")]
                parley_prometheus::record_step_error(&ticket.action.to_string());
                Err(e)
            }
            Ok(outcome) => Ok(Some(outcome)),
        }
    }

    /// Waits for every in-flight AI call and applies its result.
    pub async fn settle(&mut self) {
        self.ai_tasks.close();
        self.ai_tasks.wait().await;
        self.ai_tasks.reopen();

        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event).await;
        }
    }

    fn spawn_ai_call(&self, ticket_id: TicketId, request: CompletionRequest) {
        let provider = self.steps.adapters().provider.clone();
        let events_tx = self.events_tx.clone();

        self.ai_tasks.spawn(async move {
            let started = Instant::now();
            let outcome = provider.complete(request).await;
            let elapsed = started.elapsed();
            debug!(
                ticket_id = %ticket_id,
                elapsed_ms = elapsed.as_millis() as u64,
                ok = outcome.is_ok(),
                "AI call returned"
            );

            #[cfg(feature = "prometheus")]
            parley_prometheus::record_ai_latency(elapsed.as_secs_f64());

            if events_tx
                .send(WorkerEvent::AiCompleted { ticket_id, outcome })
                .is_err()
            {
                warn!("worker gone, AI result dropped");
            }
        });
    }

    async fn apply(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::AiCompleted { ticket_id, outcome } => {
                match self.steps.finish_ai_request(&ticket_id, outcome).await {
                    Ok(disposition) => {
                        debug!(ticket_id = %ticket_id, ?disposition, "AI result applied");
                    }
                    Err(e) => log_step_error(self.conversation_id(), &e),
                }
            }
        }
    }
}

fn log_step_error(conversation_id: ConversationId, e: &ParleyError) {
    if e.is_guard_violation() {
        debug!(conversation_id = %conversation_id, error = %e, "step skipped");
    } else if e.is_not_found() {
        warn!(conversation_id = %conversation_id, error = %e, "dequeued ticket is gone");
    } else {
        error!(conversation_id = %conversation_id, error = %e, "step failed");
    }
}
