// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation history log and watermark.

use parley_core::{ChatMessage, ConversationId, MessageId, ParleyError};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

/// Load the conversation's history, oldest entry first.
pub async fn get_history(
    db: &Database,
    conversation_id: ConversationId,
) -> Result<Option<Vec<ChatMessage>>, ParleyError> {
    let json = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT messages FROM conversation_history WHERE conversation_id = ?1",
                params![conversation_id.0],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    json.map(|s| serde_json::from_str(&s).map_err(ParleyError::storage))
        .transpose()
}

/// Replace the conversation's history.
pub async fn put_history(
    db: &Database,
    conversation_id: ConversationId,
    messages: &[ChatMessage],
) -> Result<(), ParleyError> {
    let json = serde_json::to_string(messages).map_err(ParleyError::storage)?;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO conversation_history (conversation_id, messages)
                 VALUES (?1, ?2)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                    messages = excluded.messages,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![conversation_id.0, json],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_watermark(
    db: &Database,
    conversation_id: ConversationId,
) -> Result<Option<MessageId>, ParleyError> {
    db.connection()
        .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
            conn.query_row(
                "SELECT watermark FROM conversation_watermarks WHERE conversation_id = ?1",
                params![conversation_id.0],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map(|w| w.map(MessageId))
        .map_err(crate::database::map_tr_err)
}

/// Store the watermark as given; it may move backwards.
pub async fn set_watermark(
    db: &Database,
    conversation_id: ConversationId,
    watermark: MessageId,
) -> Result<(), ParleyError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO conversation_watermarks (conversation_id, watermark)
                 VALUES (?1, ?2)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                    watermark = excluded.watermark,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![conversation_id.0, watermark.0],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
