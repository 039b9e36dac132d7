// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticket persistence.

use chrono::{DateTime, Utc};
use parley_core::{ParleyError, Ticket, TicketId};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;
use crate::queries::timestamp;

/// Insert or overwrite a ticket.
pub async fn put_ticket(db: &Database, ticket: &Ticket) -> Result<(), ParleyError> {
    let payload = serde_json::to_string(ticket).map_err(ParleyError::storage)?;
    let id = ticket.id.0.clone();
    let conversation_id = ticket.conversation_id.0;
    let status = ticket.status.to_string();
    let action = ticket.action.to_string();
    let updated_at = timestamp(ticket.updated_at);
    let expires_at = timestamp(ticket.expires_at);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO tickets (id, conversation_id, status, action, payload, updated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    action = excluded.action,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at,
                    expires_at = excluded.expires_at",
                params![id, conversation_id, status, action, payload, updated_at, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Load a ticket by id.
pub async fn get_ticket(db: &Database, id: &TicketId) -> Result<Option<Ticket>, ParleyError> {
    let id = id.0.clone();
    let payload = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT payload FROM tickets WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    payload
        .map(|json| serde_json::from_str(&json).map_err(ParleyError::storage))
        .transpose()
}

/// Delete a ticket. Missing ids are ignored.
pub async fn delete_ticket(db: &Database, id: &TicketId) -> Result<(), ParleyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM tickets WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Ids of tickets whose lease ended at or before `now`, oldest lease first.
pub async fn list_expired_tickets(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<TicketId>, ParleyError> {
    let now = timestamp(now);
    db.connection()
        .call(move |conn| -> Result<Vec<TicketId>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id FROM tickets WHERE expires_at <= ?1 ORDER BY expires_at ASC",
            )?;
            let rows = stmt.query_map(params![now], |row| row.get::<_, String>(0).map(TicketId))?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_core::{ConversationId, MessageId, TicketRequest, TicketStatus};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tickets.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn ticket(message_id: i64) -> Ticket {
        Ticket::new(
            ConversationId(1),
            TicketRequest {
                text: format!("msg {message_id}"),
                message_id: MessageId(message_id),
                attachment: None,
            },
            MessageId(message_id + 1),
            Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn put_then_get_returns_same_ticket() {
        let (db, _dir) = setup_db().await;
        let t = ticket(100);
        put_ticket(&db, &t).await.unwrap();
        let loaded = get_ticket(&db, &t.id).await.unwrap();
        assert_eq!(loaded, Some(t));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn put_overwrites_existing_ticket() {
        let (db, _dir) = setup_db().await;
        let mut t = ticket(100);
        put_ticket(&db, &t).await.unwrap();

        t.status = TicketStatus::InProgress;
        t.retry_count = 2;
        put_ticket(&db, &t).await.unwrap();

        let loaded = get_ticket(&db, &t.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::InProgress);
        assert_eq!(loaded.retry_count, 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_ticket_is_none() {
        let (db, _dir) = setup_db().await;
        let loaded = get_ticket(&db, &TicketId("nope".into())).await.unwrap();
        assert!(loaded.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_ticket_and_ignores_missing() {
        let (db, _dir) = setup_db().await;
        let t = ticket(5);
        put_ticket(&db, &t).await.unwrap();
        delete_ticket(&db, &t.id).await.unwrap();
        assert!(get_ticket(&db, &t.id).await.unwrap().is_none());
        delete_ticket(&db, &t.id).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_tickets_are_listed_oldest_first() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();

        let mut old = ticket(1);
        old.expires_at = now - Duration::minutes(30);
        let mut older = ticket(2);
        older.expires_at = now - Duration::hours(2);
        let live = ticket(3);

        for t in [&old, &older, &live] {
            put_ticket(&db, t).await.unwrap();
        }

        let expired = list_expired_tickets(&db, now).await.unwrap();
        assert_eq!(expired, vec![older.id.clone(), old.id.clone()]);
        db.close().await.unwrap();
    }
}
