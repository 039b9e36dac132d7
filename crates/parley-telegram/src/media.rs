// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Attachment references and file downloads.

use parley_core::{AttachmentRef, ParleyError};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::debug;

/// Extracts a reference to the message's document or photo, if any.
///
/// For photos the largest size (last in the array) is referenced.
pub fn attachment_ref(msg: &Message) -> Option<AttachmentRef> {
    if let Some(doc) = msg.document() {
        return Some(AttachmentRef {
            file_id: doc.file.id.to_string(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.to_string()),
        });
    }

    msg.photo()
        .and_then(|photos| photos.last())
        .map(|largest| AttachmentRef {
            file_id: largest.file.id.to_string(),
            file_name: None,
            mime_type: Some("image/jpeg".to_string()),
        })
}

/// Downloads a file from Telegram servers by its file id.
///
/// Uses the Bot API's `getFile` to resolve the file path, then downloads
/// the file content as bytes.
pub async fn download_file(bot: &Bot, file_id: &str) -> Result<Vec<u8>, ParleyError> {
    let file = bot
        .get_file(FileId(file_id.to_string()))
        .await
        .map_err(|e| ParleyError::Channel {
            message: format!("failed to get file info: {e}"),
            source: Some(Box::new(e)),
        })?;

    let mut buf = Vec::new();
    bot.download_file(&file.path, &mut buf)
        .await
        .map_err(|e| ParleyError::Channel {
            message: format!("failed to download file: {e}"),
            source: Some(Box::new(e)),
        })?;

    debug!(file_id, size = buf.len(), "downloaded file from Telegram");
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::tests::make_message;

    #[test]
    fn photo_references_largest_size() {
        let msg = make_message(
            1,
            3,
            serde_json::json!({
                "photo": [
                    {"file_id": "small", "file_unique_id": "s", "width": 90, "height": 90},
                    {"file_id": "large", "file_unique_id": "l", "width": 1280, "height": 1280},
                ],
            }),
        );
        let attachment = attachment_ref(&msg).unwrap();
        assert_eq!(attachment.file_id, "large");
        assert_eq!(attachment.mime_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn text_message_has_no_attachment() {
        let msg = make_message(1, 4, serde_json::json!({"text": "plain"}));
        assert!(attachment_ref(&msg).is_none());
    }
}
