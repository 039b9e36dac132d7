// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock AI provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured replies
//! and failures, enabling fast, CI-runnable tests without API calls.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use parley_core::{
    AdapterType, CompletionRequest, CompletionResponse, HealthStatus, ParleyError,
    PluginAdapter, ProviderAdapter, TokenUsage,
};

const DEFAULT_RESPONSE: &str = "mock response";

/// A mock AI provider.
///
/// Scripted outcomes are popped from a FIFO queue. When the queue is empty,
/// the default "mock response" text is returned. Every request is recorded.
pub struct MockProvider {
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    /// Create a mock provider pre-loaded with the given replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Wait this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn add_response(&self, text: String) {
        self.script.lock().await.push_back(Ok(text));
    }

    /// Queue a provider error with the given message.
    pub async fn add_failure(&self, message: String) {
        self.script.lock().await.push_back(Err(message));
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ParleyError> {
        let prompt_tokens = request.messages.len() as u32;
        self.requests.lock().await.push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_RESPONSE.to_string()));

        match next {
            Ok(text) => Ok(CompletionResponse {
                text,
                model: "mock-model".to_string(),
                usage: Some(TokenUsage {
                    prompt_tokens,
                    completion_tokens: 1,
                }),
            }),
            Err(message) => Err(ParleyError::Provider {
                message,
                source: None,
            }),
        }
    }
}
