// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for the AI completion service.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CompletionRequest, CompletionResponse};

/// Adapter for the AI completion service.
///
/// Single-shot only: the relay never streams partial answers.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Submits the conversation window and returns the full completion.
    async fn complete(&self, request: CompletionRequest)
    -> Result<CompletionResponse, ParleyError>;
}
