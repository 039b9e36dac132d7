// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory storage adapter for deterministic testing.
//!
//! `MemoryStorage` mirrors the SQLite adapter's semantics: the pool is a
//! sorted set keyed by priority with insertion order as tie-break, and
//! re-adding a member only updates its priority.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use parley_core::{
    AdapterType, ChatMessage, ConversationId, HealthStatus, MessageId, ParleyError,
    PluginAdapter, StorageAdapter, Ticket, TicketId,
};

type PoolKey = (MessageId, u64);

#[derive(Default)]
struct State {
    tickets: HashMap<TicketId, Ticket>,
    pools: HashMap<ConversationId, BTreeMap<PoolKey, TicketId>>,
    history: HashMap<ConversationId, Vec<ChatMessage>>,
    watermarks: HashMap<ConversationId, MessageId>,
    next_seq: u64,
}

/// A storage adapter backed by plain maps behind one async mutex.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
    fail_history_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put_history` fail with a storage error until switched off.
    pub fn fail_history_writes(&self, fail: bool) {
        self.fail_history_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PluginAdapter for MemoryStorage {
    fn name(&self) -> &str {
        "memory-storage"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, ParleyError> {
        Ok(self.state.lock().await.tickets.get(id).cloned())
    }

    async fn put_ticket(&self, ticket: &Ticket) -> Result<(), ParleyError> {
        self.state
            .lock()
            .await
            .tickets
            .insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    async fn delete_ticket(&self, id: &TicketId) -> Result<(), ParleyError> {
        self.state.lock().await.tickets.remove(id);
        Ok(())
    }

    async fn list_expired_tickets(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TicketId>, ParleyError> {
        Ok(self
            .state
            .lock()
            .await
            .tickets
            .values()
            .filter(|t| t.is_expired(now))
            .map(|t| t.id.clone())
            .collect())
    }

    async fn enqueue_pool(
        &self,
        conversation_id: ConversationId,
        ticket_id: &TicketId,
        priority: MessageId,
    ) -> Result<(), ParleyError> {
        let mut state = self.state.lock().await;
        let fresh_seq = state.next_seq;
        state.next_seq += 1;

        let pool = state.pools.entry(conversation_id).or_default();
        let existing = pool
            .iter()
            .find(|(_, member)| *member == ticket_id)
            .map(|(key, _)| *key);
        let seq = match existing {
            Some(key) => {
                pool.remove(&key);
                key.1
            }
            None => fresh_seq,
        };
        pool.insert((priority, seq), ticket_id.clone());
        Ok(())
    }

    async fn dequeue_pool(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<TicketId>, ParleyError> {
        let mut state = self.state.lock().await;
        Ok(state
            .pools
            .get_mut(&conversation_id)
            .and_then(|pool| pool.pop_first())
            .map(|(_, id)| id))
    }

    async fn peek_min_priority(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, ParleyError> {
        let state = self.state.lock().await;
        Ok(state
            .pools
            .get(&conversation_id)
            .and_then(|pool| pool.first_key_value())
            .map(|((priority, _), _)| *priority))
    }

    async fn pool_len(&self, conversation_id: ConversationId) -> Result<usize, ParleyError> {
        let state = self.state.lock().await;
        Ok(state.pools.get(&conversation_id).map_or(0, BTreeMap::len))
    }

    async fn get_history(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Vec<ChatMessage>>, ParleyError> {
        Ok(self.state.lock().await.history.get(&conversation_id).cloned())
    }

    async fn put_history(
        &self,
        conversation_id: ConversationId,
        messages: &[ChatMessage],
    ) -> Result<(), ParleyError> {
        if self.fail_history_writes.load(Ordering::SeqCst) {
            return Err(ParleyError::storage("history write rejected by test"));
        }
        self.state
            .lock()
            .await
            .history
            .insert(conversation_id, messages.to_vec());
        Ok(())
    }

    async fn get_watermark(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, ParleyError> {
        Ok(self.state.lock().await.watermarks.get(&conversation_id).copied())
    }

    async fn set_watermark(
        &self,
        conversation_id: ConversationId,
        watermark: MessageId,
    ) -> Result<(), ParleyError> {
        self.state
            .lock()
            .await
            .watermarks
            .insert(conversation_id, watermark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV: ConversationId = ConversationId(7);

    fn id(s: &str) -> TicketId {
        TicketId(s.to_string())
    }

    #[tokio::test]
    async fn pool_pops_lowest_priority_first() {
        let storage = MemoryStorage::new();
        storage.enqueue_pool(CONV, &id("a"), MessageId(5)).await.unwrap();
        storage.enqueue_pool(CONV, &id("b"), MessageId(3)).await.unwrap();
        storage.enqueue_pool(CONV, &id("c"), MessageId(7)).await.unwrap();

        assert_eq!(storage.peek_min_priority(CONV).await.unwrap(), Some(MessageId(3)));
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), Some(id("b")));
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), Some(id("a")));
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), Some(id("c")));
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), None);
    }

    #[tokio::test]
    async fn equal_priorities_pop_in_insertion_order() {
        let storage = MemoryStorage::new();
        storage.enqueue_pool(CONV, &id("first"), MessageId(1)).await.unwrap();
        storage.enqueue_pool(CONV, &id("second"), MessageId(1)).await.unwrap();
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), Some(id("first")));
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), Some(id("second")));
    }

    #[tokio::test]
    async fn re_adding_member_updates_priority() {
        let storage = MemoryStorage::new();
        storage.enqueue_pool(CONV, &id("a"), MessageId(9)).await.unwrap();
        storage.enqueue_pool(CONV, &id("b"), MessageId(4)).await.unwrap();
        storage.enqueue_pool(CONV, &id("a"), MessageId(2)).await.unwrap();

        assert_eq!(storage.pool_len(CONV).await.unwrap(), 2);
        assert_eq!(storage.dequeue_pool(CONV).await.unwrap(), Some(id("a")));
    }

    #[tokio::test]
    async fn pools_are_per_conversation() {
        let storage = MemoryStorage::new();
        storage.enqueue_pool(CONV, &id("a"), MessageId(1)).await.unwrap();
        assert_eq!(storage.pool_len(ConversationId(8)).await.unwrap(), 0);
        assert_eq!(storage.dequeue_pool(ConversationId(8)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_write_failure_is_switchable() {
        let storage = MemoryStorage::new();
        storage.fail_history_writes(true);
        let err = storage
            .put_history(CONV, &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Storage { .. }));
        assert_eq!(storage.get_history(CONV).await.unwrap(), None);

        storage.fail_history_writes(false);
        storage.put_history(CONV, &[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(storage.get_history(CONV).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watermark_starts_unset() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_watermark(CONV).await.unwrap(), None);
        storage.set_watermark(CONV, MessageId(12)).await.unwrap();
        assert_eq!(storage.get_watermark(CONV).await.unwrap(), Some(MessageId(12)));
    }

    proptest::proptest! {
        #[test]
        fn pool_drains_in_priority_order(priorities in proptest::collection::vec(-50i64..50, 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let drained = rt.block_on(async {
                let storage = MemoryStorage::new();
                for (i, p) in priorities.iter().enumerate() {
                    storage
                        .enqueue_pool(CONV, &id(&format!("t{i}")), MessageId(*p))
                        .await
                        .unwrap();
                }
                let mut drained = Vec::new();
                while let Some(min) = storage.peek_min_priority(CONV).await.unwrap() {
                    storage.dequeue_pool(CONV).await.unwrap();
                    drained.push(min.0);
                }
                drained
            });

            let mut expected = priorities.clone();
            expected.sort();
            proptest::prop_assert_eq!(drained, expected);
        }
    }
}
