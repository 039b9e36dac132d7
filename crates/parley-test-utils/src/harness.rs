// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration test harness for end-to-end workflow testing.
//!
//! Wires the real [`Dispatcher`] and [`WorkerRegistry`] to mock chat and AI
//! adapters. Storage is in-memory by default, or a temp SQLite database.

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::{StorageConfig, TelegramConfig, WorkflowConfig};
use parley_core::{
    ConversationId, ParleyError, StorageAdapter, Ticket, TicketId,
};
use parley_engine::{Adapters, ConversationWorker, Dispatcher, WorkerRegistry};
use parley_storage::SqliteStorage;

use crate::memory_storage::MemoryStorage;
use crate::mock_channel::MockChannel;
use crate::mock_provider::MockProvider;

/// Chat allowed by default in every harness.
pub const TEST_CHAT_ID: i64 = 1;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for constructing a [`TestHarness`] with custom configuration.
pub struct TestHarnessBuilder {
    provider: Option<MockProvider>,
    responses: Vec<String>,
    allowed_chats: Vec<i64>,
    workflow: WorkflowConfig,
    use_sqlite: bool,
    background_workers: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            provider: None,
            responses: Vec::new(),
            allowed_chats: vec![TEST_CHAT_ID],
            workflow: WorkflowConfig {
                idle_poll_ms: 5,
                step_backoff_ms: 1,
                drain_timeout_secs: 5,
                ..WorkflowConfig::default()
            },
            use_sqlite: false,
            background_workers: true,
        }
    }

    /// Configure the mock provider with pre-defined replies.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Use a fully configured mock provider; overrides `with_mock_responses`.
    pub fn with_provider(mut self, provider: MockProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn allow_chat(mut self, chat_id: i64) -> Self {
        self.allowed_chats.push(chat_id);
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = workflow;
        self
    }

    /// Back the harness with a temp SQLite database instead of memory.
    pub fn with_sqlite(mut self) -> Self {
        self.use_sqlite = true;
        self
    }

    /// Open tickets without starting workers; drive them with
    /// [`TestHarness::worker`] instead.
    pub fn without_background_workers(mut self) -> Self {
        self.background_workers = false;
        self
    }

    /// Build the test harness.
    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let mut temp_dir = None;
        let storage: Arc<dyn StorageAdapter + Send + Sync> = if self.use_sqlite {
            let dir = tempfile::tempdir().map_err(ParleyError::storage)?;
            let db_path = dir.path().join("parley-test.db");
            let storage = SqliteStorage::new(StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            });
            storage.initialize().await?;
            temp_dir = Some(dir);
            Arc::new(storage)
        } else {
            Arc::new(MemoryStorage::new())
        };

        let mock_provider = Arc::new(
            self.provider
                .unwrap_or_else(|| MockProvider::with_responses(self.responses)),
        );
        let mock_channel = Arc::new(MockChannel::new());

        let adapters = Adapters {
            storage: storage.clone(),
            provider: mock_provider.clone(),
            channel: mock_channel.clone(),
        };

        let registry = Arc::new(WorkerRegistry::new(adapters.clone(), self.workflow.clone()));
        if !self.background_workers {
            // A shut-down registry refuses to start workers.
            registry.shutdown().await?;
        }

        let telegram = TelegramConfig {
            allowed_chat_ids: self.allowed_chats,
            ..TelegramConfig::default()
        };
        let dispatcher = Dispatcher::new(&adapters, registry.clone(), &telegram, &self.workflow);

        Ok(TestHarness {
            storage,
            mock_channel,
            mock_provider,
            registry,
            dispatcher,
            adapters,
            workflow: self.workflow,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment around the real workflow engine.
pub struct TestHarness {
    pub storage: Arc<dyn StorageAdapter + Send + Sync>,
    pub mock_channel: Arc<MockChannel>,
    pub mock_provider: Arc<MockProvider>,
    pub registry: Arc<WorkerRegistry>,
    pub dispatcher: Dispatcher,
    adapters: Adapters,
    workflow: WorkflowConfig,
    /// Keeps the SQLite file alive until the harness drops.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Deliver a text message through intake, as if the user sent it.
    pub async fn send_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Option<TicketId>, ParleyError> {
        self.dispatcher
            .handle_inbound(MockChannel::text_message(chat_id, message_id, text))
            .await
    }

    /// A detached worker for stepping a conversation by hand.
    pub fn worker(&self, chat_id: i64) -> ConversationWorker {
        ConversationWorker::new(ConversationId(chat_id), self.adapters.clone(), &self.workflow)
    }

    /// Wait until the ticket is delivered or terminal.
    ///
    /// Returns `None` once the ticket is gone (delivered), or the ticket
    /// itself if it ended in a terminal status.
    pub async fn settle(&self, ticket_id: &TicketId) -> Result<Option<Ticket>, ParleyError> {
        let poll = async {
            loop {
                match self.storage.get_ticket(ticket_id).await? {
                    None => return Ok(None),
                    Some(t) if t.status.is_terminal() => return Ok(Some(t)),
                    Some(_) => tokio::time::sleep(POLL_INTERVAL).await,
                }
            }
        };
        tokio::time::timeout(SETTLE_TIMEOUT, poll)
            .await
            .map_err(|_| ParleyError::Timeout {
                duration: SETTLE_TIMEOUT,
            })?
    }

    /// Stop all workers.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        self.registry.shutdown().await
    }
}
