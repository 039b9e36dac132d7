// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry owning the lifecycle of conversation workers.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parley_config::model::WorkflowConfig;
use parley_core::{ConversationId, ParleyError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Adapters;
use crate::worker::ConversationWorker;

struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Starts at most one [`ConversationWorker`] per conversation.
///
/// [`ensure_worker`](Self::ensure_worker) is the only way to start a
/// worker; it is atomic, so concurrent first messages of a conversation
/// start exactly one.
pub struct WorkerRegistry {
    adapters: Adapters,
    workflow: WorkflowConfig,
    workers: DashMap<ConversationId, WorkerHandle>,
    cancel: CancellationToken,
}

impl WorkerRegistry {
    pub fn new(adapters: Adapters, workflow: WorkflowConfig) -> Self {
        Self {
            adapters,
            workflow,
            workers: DashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Starts the conversation's worker unless it is already running.
    ///
    /// Returns `true` when this call started it. After
    /// [`shutdown`](Self::shutdown) no new workers are started.
    pub fn ensure_worker(&self, conversation_id: ConversationId) -> bool {
        if self.cancel.is_cancelled() {
            debug!(conversation_id = %conversation_id, "registry shut down, worker not started");
            return false;
        }

        let started = match self.workers.entry(conversation_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let cancel = self.cancel.child_token();
                let worker =
                    ConversationWorker::new(conversation_id, self.adapters.clone(), &self.workflow);
                let join = tokio::spawn(worker.run(cancel.clone()));
                slot.insert(WorkerHandle { cancel, join });
                true
            }
        };

        if started {
            debug!(conversation_id = %conversation_id, "worker registered");

            #[cfg(feature = "prometheus")]
            parley_prometheus::set_active_workers(self.workers.len());
        }
        started
    }

    pub fn contains(&self, conversation_id: ConversationId) -> bool {
        self.workers.contains_key(&conversation_id)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stops one conversation's worker and waits for it to finish.
    pub async fn stop_worker(&self, conversation_id: ConversationId) -> bool {
        let Some((_, handle)) = self.workers.remove(&conversation_id) else {
            return false;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.join.await {
            warn!(conversation_id = %conversation_id, error = %e, "worker task failed");
        }

        #[cfg(feature = "prometheus")]
        parley_prometheus::set_active_workers(self.workers.len());

        true
    }

    /// Cancels every worker and waits up to the drain timeout for them.
    ///
    /// Workers finish their in-flight AI calls before exiting. Returns
    /// [`ParleyError::Timeout`] if some did not stop in time.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        self.cancel.cancel();

        let ids: Vec<ConversationId> = self.workers.iter().map(|entry| *entry.key()).collect();
        let joins: Vec<JoinHandle<()>> = ids
            .into_iter()
            .filter_map(|id| self.workers.remove(&id))
            .map(|(_, handle)| handle.join)
            .collect();

        #[cfg(feature = "prometheus")]
        parley_prometheus::set_active_workers(0);

        if joins.is_empty() {
            info!("no conversation workers to drain");
            return Ok(());
        }

        let count = joins.len();
        info!(count, "waiting for conversation workers to drain");

        let timeout = self.workflow.drain_timeout();
        match tokio::time::timeout(timeout, futures::future::join_all(joins)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!(error = %e, "worker task failed during drain");
                    }
                }
                info!(count, "all conversation workers drained");
                Ok(())
            }
            Err(_) => {
                warn!(count, "drain timeout reached, some workers interrupted");
                Err(ParleyError::Timeout { duration: timeout })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_test_utils::{MemoryStorage, MockChannel, MockProvider};

    fn registry() -> Arc<WorkerRegistry> {
        let adapters = Adapters {
            storage: Arc::new(MemoryStorage::new()),
            provider: Arc::new(MockProvider::new()),
            channel: Arc::new(MockChannel::new()),
        };
        let workflow = WorkflowConfig {
            idle_poll_ms: 5,
            drain_timeout_secs: 5,
            ..WorkflowConfig::default()
        };
        Arc::new(WorkerRegistry::new(adapters, workflow))
    }

    #[tokio::test]
    async fn ensure_worker_starts_once() {
        let reg = registry();
        assert!(reg.ensure_worker(ConversationId(1)));
        assert!(!reg.ensure_worker(ConversationId(1)));
        assert!(reg.ensure_worker(ConversationId(2)));
        assert_eq!(reg.len(), 2);
        reg.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_messages_start_one_worker() {
        let reg = registry();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move { reg.ensure_worker(ConversationId(9)) }));
        }

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(reg.len(), 1);
        reg.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_drains_and_refuses_new_workers() {
        let reg = registry();
        reg.ensure_worker(ConversationId(1));
        reg.ensure_worker(ConversationId(2));

        reg.shutdown().await.unwrap();
        assert!(reg.is_empty());
        assert!(!reg.ensure_worker(ConversationId(3)));
    }

    #[tokio::test]
    async fn stop_worker_removes_entry() {
        let reg = registry();
        reg.ensure_worker(ConversationId(1));
        assert!(reg.stop_worker(ConversationId(1)).await);
        assert!(!reg.contains(ConversationId(1)));
        assert!(!reg.stop_worker(ConversationId(1)).await);
        reg.shutdown().await.unwrap();
    }
}
