// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock channel adapter for deterministic testing.
//!
//! `MockChannel` implements `ChannelAdapter` with message injection (for
//! simulating inbound chat messages) and capture of placeholder replies
//! and edits (for asserting on what the user would see).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use parley_core::{
    AdapterType, AttachmentRef, ChannelAdapter, ConversationId, HealthStatus, InboundMessage,
    MessageId, ParleyError, PluginAdapter,
};

/// First id handed out for messages the mock channel sends.
const FIRST_SENT_ID: i64 = 10_000;

/// A reply sent through [`ChannelAdapter::send_reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub conversation_id: ConversationId,
    pub in_reply_to: MessageId,
    pub text: String,
    /// Id the channel assigned to the reply.
    pub message_id: MessageId,
}

/// An edit made through [`ChannelAdapter::edit_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedMessage {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub text: String,
}

/// A mock chat channel for testing.
///
/// - `inject_message()` pushes messages that `receive()` will return.
/// - `replies()` and `edits()` return everything the engine sent.
/// - `set_fail_sends()` / `set_fail_edits()` make the platform calls fail.
pub struct MockChannel {
    inbound: Mutex<VecDeque<InboundMessage>>,
    inbound_notify: Notify,
    closed: AtomicBool,
    replies: Mutex<Vec<SentReply>>,
    edits: Mutex<Vec<EditedMessage>>,
    next_message_id: AtomicI64,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            inbound_notify: Notify::new(),
            closed: AtomicBool::new(false),
            replies: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(FIRST_SENT_ID),
            fail_sends: AtomicBool::new(false),
            fail_edits: AtomicBool::new(false),
        }
    }

    /// Build a plain text message as the platform would deliver it.
    pub fn text_message(chat_id: i64, message_id: i64, text: &str) -> InboundMessage {
        InboundMessage {
            conversation_id: ConversationId(chat_id),
            message_id: MessageId(message_id),
            text: text.to_string(),
            attachment: None,
            received_at: chrono::Utc::now(),
        }
    }

    /// Inject a message that will be returned by `receive()`.
    pub async fn inject_message(&self, msg: InboundMessage) {
        self.inbound.lock().await.push_back(msg);
        self.inbound_notify.notify_one();
    }

    /// Make pending and future `receive()` calls fail once the queue is drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbound_notify.notify_one();
    }

    pub async fn replies(&self) -> Vec<SentReply> {
        self.replies.lock().await.clone()
    }

    pub async fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().await.clone()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn channel_error(message: &str) -> ParleyError {
    ParleyError::Channel {
        message: message.to_string(),
        source: None,
    }
}

#[async_trait]
impl PluginAdapter for MockChannel {
    fn name(&self) -> &str {
        "mock-channel"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for MockChannel {
    async fn connect(&mut self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, ParleyError> {
        loop {
            if let Some(msg) = self.inbound.lock().await.pop_front() {
                return Ok(msg);
            }
            if self.closed.load(Ordering::SeqCst) {
                // Wake the next waiter so every receiver observes the close.
                self.inbound_notify.notify_one();
                return Err(channel_error("mock channel closed"));
            }
            self.inbound_notify.notified().await;
        }
    }

    async fn send_reply(
        &self,
        conversation_id: ConversationId,
        in_reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ParleyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(channel_error("send rejected by test"));
        }
        let message_id = MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst));
        self.replies.lock().await.push(SentReply {
            conversation_id,
            in_reply_to,
            text: text.to_string(),
            message_id,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), ParleyError> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(channel_error("edit rejected by test"));
        }
        self.edits.lock().await.push(EditedMessage {
            conversation_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn download_attachment(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<Vec<u8>, ParleyError> {
        Ok(format!("mock attachment {}", attachment.file_id).into_bytes())
    }
}
