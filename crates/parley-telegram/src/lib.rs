// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram channel adapter for the Parley relay.
//!
//! Implements [`ChannelAdapter`] for the Telegram Bot API via teloxide,
//! providing long polling intake, threaded replies, idempotent edits,
//! and attachment downloads.

pub mod handler;
pub mod media;

use async_trait::async_trait;
use parley_config::model::TelegramConfig;
use parley_core::{
    AdapterType, AttachmentRef, ChannelAdapter, ConversationId, HealthStatus, InboundMessage,
    MessageId, ParleyError, PluginAdapter,
};
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Telegram channel adapter implementing [`ChannelAdapter`].
///
/// Connects to Telegram via long polling and forwards every usable message.
/// Chat allow-listing is left to the dispatcher.
pub struct TelegramChannel {
    bot: Bot,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
    inbound_tx: tokio::sync::Mutex<Option<mpsc::Sender<InboundMessage>>>,
    polling_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TelegramChannel {
    /// Creates a new Telegram channel adapter.
    ///
    /// Requires `config.bot_token` to be set.
    pub fn new(config: &TelegramConfig) -> Result<Self, ParleyError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            ParleyError::Config("telegram.bot_token is required for Telegram adapter".into())
        })?;

        if token.is_empty() {
            return Err(ParleyError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }

        let bot = Bot::new(token);
        let (inbound_tx, inbound_rx) = mpsc::channel(100);

        Ok(Self {
            bot,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            inbound_tx: tokio::sync::Mutex::new(Some(inbound_tx)),
            polling_handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Returns a reference to the underlying teloxide Bot.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

impl Drop for TelegramChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.polling_handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl PluginAdapter for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // Check if the bot token is valid by calling getMe.
        match self.bot.get_me().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!(
                "Telegram bot unreachable: {e}"
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("Telegram channel shutting down");
        // Once both senders are gone, receive() drains the buffer and then
        // reports the channel closed.
        self.inbound_tx.lock().await.take();
        if let Some(handle) = self.polling_handle.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    async fn connect(&mut self) -> Result<(), ParleyError> {
        if self.polling_handle.get_mut().is_some() {
            return Ok(()); // Already connected
        }

        let bot = self.bot.clone();
        let tx = self
            .inbound_tx
            .get_mut()
            .clone()
            .ok_or_else(|| ParleyError::Channel {
                message: "Telegram inbound channel closed".into(),
                source: None,
            })?;

        info!("starting Telegram long polling");

        let handle = tokio::spawn(async move {
            let handler = Update::filter_message().endpoint(move |msg: Message| {
                let tx = tx.clone();
                async move {
                    if let Some(inbound) = handler::to_inbound_message(&msg)
                        && tx.send(inbound).await.is_err()
                    {
                        warn!("inbound channel closed, dropping message");
                    }
                    respond(())
                }
            });

            Dispatcher::builder(bot, handler)
                .default_handler(|_| async {}) // Silently ignore non-message updates
                .build()
                .dispatch()
                .await;
        });

        *self.polling_handle.get_mut() = Some(handle);
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, ParleyError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or_else(|| ParleyError::Channel {
            message: "Telegram inbound channel closed".into(),
            source: None,
        })
    }

    async fn send_reply(
        &self,
        conversation_id: ConversationId,
        in_reply_to: MessageId,
        text: &str,
    ) -> Result<MessageId, ParleyError> {
        let reply_to = to_telegram_message_id(in_reply_to)?;

        let sent = self
            .bot
            .send_message(ChatId(conversation_id.0), text)
            .reply_parameters(ReplyParameters::new(reply_to).allow_sending_without_reply())
            .await
            .map_err(|e| ParleyError::Channel {
                message: format!("failed to send message: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(MessageId(i64::from(sent.id.0)))
    }

    async fn edit_message(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        text: &str,
    ) -> Result<(), ParleyError> {
        let msg_id = to_telegram_message_id(message_id)?;

        match self
            .bot
            .edit_message_text(ChatId(conversation_id.0), msg_id, text)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e.to_string()) => {
                debug!(
                    conversation_id = %conversation_id,
                    message_id = %message_id,
                    "message already has this text"
                );
                Ok(())
            }
            Err(e) => Err(ParleyError::Channel {
                message: format!("failed to edit message: {e}"),
                source: Some(Box::new(e)),
            }),
        }
    }

    async fn download_attachment(
        &self,
        attachment: &AttachmentRef,
    ) -> Result<Vec<u8>, ParleyError> {
        media::download_file(&self.bot, &attachment.file_id).await
    }
}

/// Telegram message ids are 32-bit.
fn to_telegram_message_id(id: MessageId) -> Result<teloxide::types::MessageId, ParleyError> {
    i32::try_from(id.0)
        .map(teloxide::types::MessageId)
        .map_err(|e| ParleyError::Channel {
            message: format!("invalid message_id {id}: {e}"),
            source: None,
        })
}

/// Telegram rejects edits that would not change the message.
fn is_not_modified(error: &str) -> bool {
    error.contains("message is not modified")
}
