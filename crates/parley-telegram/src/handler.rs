// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of Telegram updates into channel-agnostic messages.
//!
//! Authorization by chat id happens in the engine's dispatcher; this module
//! only decides whether a message carries anything the relay can use.

use parley_core::{ConversationId, InboundMessage, MessageId};
use teloxide::types::Message;
use tracing::debug;

use crate::media;

/// Converts a Telegram message into an [`InboundMessage`].
///
/// Text messages use their text, media messages their caption. Returns
/// `None` when the message has neither text nor a supported attachment
/// (stickers, locations, service messages).
pub fn to_inbound_message(msg: &Message) -> Option<InboundMessage> {
    let attachment = media::attachment_ref(msg);
    let text = msg.text().or_else(|| msg.caption()).unwrap_or_default();

    if text.is_empty() && attachment.is_none() {
        debug!(msg_id = msg.id.0, "ignoring unsupported message type");
        return None;
    }

    Some(InboundMessage {
        conversation_id: ConversationId(msg.chat.id.0),
        message_id: MessageId(i64::from(msg.id.0)),
        text: text.to_string(),
        attachment,
        received_at: msg.date,
    })
}
