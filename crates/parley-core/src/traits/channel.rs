// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for the chat platform client.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AttachmentRef, ConversationId, InboundMessage, MessageId};

/// Adapter for the chat platform the relay serves.
///
/// Edits must be idempotent: re-applying the same text to a message is
/// reported as success.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Establishes a connection to the messaging platform.
    async fn connect(&mut self) -> Result<(), ParleyError>;

    /// Receives the next inbound message from the channel.
    async fn receive(&self) -> Result<InboundMessage, ParleyError>;

    /// Sends `text` as a reply to `in_reply_to`, returning the new message id.
    async fn send_reply(
        &self,
        conversation_id: ConversationId,
        in_reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ParleyError>;

    /// Replaces the text of a previously sent message.
    async fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), ParleyError>;

    /// Downloads the raw bytes of an attachment.
    async fn download_attachment(&self, attachment: &AttachmentRef)
    -> Result<Vec<u8>, ParleyError>;
}
