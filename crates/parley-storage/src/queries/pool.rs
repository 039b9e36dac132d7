// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation ticket pool, ordered by priority (originating message id).
//!
//! Behaves like a sorted set: a ticket appears at most once per conversation
//! and re-adding it only updates its priority.

use parley_core::{ConversationId, MessageId, ParleyError, TicketId};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

/// Add a ticket to the conversation's pool, or update its priority.
pub async fn enqueue(
    db: &Database,
    conversation_id: ConversationId,
    ticket_id: &TicketId,
    priority: MessageId,
) -> Result<(), ParleyError> {
    let ticket_id = ticket_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO ticket_pool (conversation_id, ticket_id, priority)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id, ticket_id) DO UPDATE SET priority = excluded.priority",
                params![conversation_id.0, ticket_id, priority.0],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove and return the lowest-priority ticket of the conversation.
///
/// Select and delete happen in one transaction on the single writer thread,
/// so a member is handed out at most once.
pub async fn dequeue(
    db: &Database,
    conversation_id: ConversationId,
) -> Result<Option<TicketId>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Option<TicketId>, rusqlite::Error> {
            let tx = conn.transaction()?;

            let head: Option<(i64, String)> = tx
                .query_row(
                    "SELECT seq, ticket_id FROM ticket_pool
                     WHERE conversation_id = ?1
                     ORDER BY priority ASC, seq ASC
                     LIMIT 1",
                    params![conversation_id.0],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let popped = match head {
                Some((seq, ticket_id)) => {
                    tx.execute("DELETE FROM ticket_pool WHERE seq = ?1", params![seq])?;
                    Some(TicketId(ticket_id))
                }
                None => None,
            };
            tx.commit()?;
            Ok(popped)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Lowest pending priority of the conversation, without removing it.
pub async fn peek_min_priority(
    db: &Database,
    conversation_id: ConversationId,
) -> Result<Option<MessageId>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
            conn.query_row(
                "SELECT MIN(priority) FROM ticket_pool WHERE conversation_id = ?1",
                params![conversation_id.0],
                |row| row.get(0),
            )
        })
        .await
        .map(|min| min.map(MessageId))
        .map_err(crate::database::map_tr_err)
}

/// Number of tickets waiting in the conversation's pool.
pub async fn len(db: &Database, conversation_id: ConversationId) -> Result<usize, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM ticket_pool WHERE conversation_id = ?1",
                params![conversation_id.0],
                |row| row.get(0),
            )
        })
        .await
        .map(|n| usize::try_from(n).unwrap_or_default())
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CONV: ConversationId = ConversationId(42);

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("pool.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn tid(s: &str) -> TicketId {
        TicketId(s.to_string())
    }

    #[tokio::test]
    async fn dequeue_yields_lowest_priority_first() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, CONV, &tid("five"), MessageId(5)).await.unwrap();
        enqueue(&db, CONV, &tid("three"), MessageId(3)).await.unwrap();
        enqueue(&db, CONV, &tid("seven"), MessageId(7)).await.unwrap();

        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("three")));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("five")));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("seven")));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), None);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn equal_priorities_dequeue_in_insertion_order() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, CONV, &tid("a"), MessageId(1)).await.unwrap();
        enqueue(&db, CONV, &tid("b"), MessageId(1)).await.unwrap();
        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("a")));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("b")));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn re_enqueue_updates_priority_without_duplicating() {
        let (db, _dir) = setup_db().await;
        enqueue(&db, CONV, &tid("x"), MessageId(9)).await.unwrap();
        enqueue(&db, CONV, &tid("y"), MessageId(5)).await.unwrap();
        enqueue(&db, CONV, &tid("x"), MessageId(2)).await.unwrap();

        assert_eq!(len(&db, CONV).await.unwrap(), 2);
        assert_eq!(peek_min_priority(&db, CONV).await.unwrap(), Some(MessageId(2)));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("x")));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pools_are_isolated_per_conversation() {
        let (db, _dir) = setup_db().await;
        let other = ConversationId(7);
        enqueue(&db, CONV, &tid("mine"), MessageId(10)).await.unwrap();
        enqueue(&db, other, &tid("theirs"), MessageId(1)).await.unwrap();

        assert_eq!(peek_min_priority(&db, CONV).await.unwrap(), Some(MessageId(10)));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), Some(tid("mine")));
        assert_eq!(dequeue(&db, CONV).await.unwrap(), None);
        assert_eq!(len(&db, other).await.unwrap(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn peek_on_empty_pool_is_none() {
        let (db, _dir) = setup_db().await;
        assert_eq!(peek_min_priority(&db, CONV).await.unwrap(), None);
        assert_eq!(len(&db, CONV).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_dequeues_never_share_a_ticket() {
        let (db, _dir) = setup_db().await;
        for i in 0..20 {
            enqueue(&db, CONV, &tid(&format!("t{i}")), MessageId(i)).await.unwrap();
        }

        let db = std::sync::Arc::new(db);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(id) = dequeue(&db, CONV).await.unwrap() {
                    got.push(id);
                }
                got
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.dedup();
        assert_eq!(all.len(), 20);
    }
}
