// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::{
    AdapterType, ChatMessage, ConversationId, HealthStatus, MessageId, ParleyError,
    PluginAdapter, StorageAdapter, Ticket, TicketId,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until `initialize` is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ParleyError> {
        self.db
            .get()
            .ok_or_else(|| ParleyError::storage("storage not initialized -- call initialize() first"))
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open_with_options(&self.config.database_path, self.config.wal_mode)
            .await?;
        self.db
            .set(db)
            .map_err(|_| ParleyError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ParleyError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Tickets ---

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, ParleyError> {
        queries::tickets::get_ticket(self.db()?, id).await
    }

    async fn put_ticket(&self, ticket: &Ticket) -> Result<(), ParleyError> {
        queries::tickets::put_ticket(self.db()?, ticket).await
    }

    async fn delete_ticket(&self, id: &TicketId) -> Result<(), ParleyError> {
        queries::tickets::delete_ticket(self.db()?, id).await
    }

    async fn list_expired_tickets(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TicketId>, ParleyError> {
        queries::tickets::list_expired_tickets(self.db()?, now).await
    }

    // --- Pool ---

    async fn enqueue_pool(
        &self,
        conversation_id: ConversationId,
        ticket_id: &TicketId,
        priority: MessageId,
    ) -> Result<(), ParleyError> {
        queries::pool::enqueue(self.db()?, conversation_id, ticket_id, priority).await
    }

    async fn dequeue_pool(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<TicketId>, ParleyError> {
        queries::pool::dequeue(self.db()?, conversation_id).await
    }

    async fn peek_min_priority(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, ParleyError> {
        queries::pool::peek_min_priority(self.db()?, conversation_id).await
    }

    async fn pool_len(&self, conversation_id: ConversationId) -> Result<usize, ParleyError> {
        queries::pool::len(self.db()?, conversation_id).await
    }

    // --- Conversation history ---

    async fn get_history(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<Vec<ChatMessage>>, ParleyError> {
        queries::history::get_history(self.db()?, conversation_id).await
    }

    async fn put_history(
        &self,
        conversation_id: ConversationId,
        messages: &[ChatMessage],
    ) -> Result<(), ParleyError> {
        queries::history::put_history(self.db()?, conversation_id, messages).await
    }

    async fn get_watermark(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<MessageId>, ParleyError> {
        queries::history::get_watermark(self.db()?, conversation_id).await
    }

    async fn set_watermark(
        &self,
        conversation_id: ConversationId,
        watermark: MessageId,
    ) -> Result<(), ParleyError> {
        queries::history::set_watermark(self.db()?, conversation_id, watermark).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_core::{TicketRequest, TicketStatus};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    async fn ready_storage(dir: &tempfile::TempDir, name: &str) -> SqliteStorage {
        let db_path = dir.path().join(name);
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let storage = ready_storage(&dir, "double_init.db").await;
        assert!(storage.initialize().await.is_err(), "second initialize should fail");
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        let err = storage.dequeue_pool(ConversationId(1)).await.unwrap_err();
        assert!(matches!(err, ParleyError::Storage { .. }));
    }

    #[tokio::test]
    async fn health_check_returns_healthy_when_initialized() {
        let dir = tempdir().unwrap();
        let storage = ready_storage(&dir, "health.db").await;
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn ticket_round_trip_through_pool() {
        let dir = tempdir().unwrap();
        let storage = ready_storage(&dir, "lifecycle.db").await;
        let conv = ConversationId(99);

        let ticket = Ticket::new(
            conv,
            TicketRequest {
                text: "Hi".into(),
                message_id: MessageId(100),
                attachment: None,
            },
            MessageId(101),
            Duration::hours(1),
        );
        storage.put_ticket(&ticket).await.unwrap();
        storage
            .enqueue_pool(conv, &ticket.id, ticket.priority())
            .await
            .unwrap();
        assert_eq!(storage.pool_len(conv).await.unwrap(), 1);

        let popped = storage.dequeue_pool(conv).await.unwrap().unwrap();
        let mut loaded = storage.get_ticket(&popped).await.unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::New);

        loaded.status = TicketStatus::InProgress;
        storage.put_ticket(&loaded).await.unwrap();
        storage.delete_ticket(&loaded.id).await.unwrap();
        assert!(storage.get_ticket(&loaded.id).await.unwrap().is_none());

        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn history_and_watermark_through_adapter() {
        let dir = tempdir().unwrap();
        let storage = ready_storage(&dir, "history.db").await;
        let conv = ConversationId(5);

        storage
            .put_history(conv, &[ChatMessage::user("Hi"), ChatMessage::assistant("Hello")])
            .await
            .unwrap();
        storage.set_watermark(conv, MessageId(101)).await.unwrap();

        assert_eq!(storage.get_history(conv).await.unwrap().unwrap().len(), 2);
        assert_eq!(storage.get_watermark(conv).await.unwrap(), Some(MessageId(101)));
        storage.shutdown().await.unwrap();
    }
}
