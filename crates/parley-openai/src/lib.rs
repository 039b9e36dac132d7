// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI provider adapter for the Parley relay.
//!
//! Implements [`ProviderAdapter`] over the Chat Completions API. Only
//! single-shot completions are used.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use parley_config::ParleyConfig;
use parley_core::{
    AdapterType, Author, ChatMessage, CompletionRequest, CompletionResponse, HealthStatus,
    ParleyError, PluginAdapter, ProviderAdapter, TokenUsage,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::types::{ApiMessage, ChatCompletionRequest};

/// Environment variable consulted when `openai.api_key` is unset.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// OpenAI provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config -> `OPENAI_API_KEY` env var -> error.
pub struct OpenAiProvider {
    client: OpenAiClient,
    model: String,
    max_tokens: u32,
    /// Used when a request carries no system prompt of its own.
    system_prompt: Option<String>,
}

impl OpenAiProvider {
    /// Creates a new OpenAI provider from the given configuration.
    pub fn new(config: &ParleyConfig) -> Result<Self, ParleyError> {
        let api_key = resolve_api_key(&config.openai.api_key)?;
        let client = OpenAiClient::new(
            &api_key,
            &config.openai.base_url,
            Duration::from_secs(config.openai.request_timeout_secs),
        )?;

        info!(model = config.openai.model, "OpenAI provider initialized");

        Ok(Self::with_client(
            client,
            config.openai.model.clone(),
            config.openai.max_tokens,
            config.agent.system_prompt.clone(),
        ))
    }

    /// Creates a provider around an existing client.
    pub fn with_client(
        client: OpenAiClient,
        model: String,
        max_tokens: u32,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            client,
            model,
            max_tokens,
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
        }
    }

    fn to_api_request(&self, request: &CompletionRequest) -> ChatCompletionRequest {
        let system = request
            .system_prompt
            .as_ref()
            .or(self.system_prompt.as_ref());

        let messages = system
            .map(|prompt| ApiMessage {
                role: "system".into(),
                content: prompt.clone(),
            })
            .into_iter()
            .chain(request.messages.iter().map(to_api_message))
            .collect();

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(self.max_tokens),
            user: request.conversation_id.map(|id| format!("chat-{id}")),
        }
    }
}

fn to_api_message(message: &ChatMessage) -> ApiMessage {
    let role = match message.author {
        Author::User => "user",
        Author::Assistant => "assistant",
    };
    ApiMessage {
        role: role.into(),
        content: message.text.clone(),
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        // No test completion: it would consume tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ParleyError> {
        let api_request = self.to_api_request(&request);
        let response = self.client.complete(&api_request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParleyError::Provider {
                message: format!("completion {} returned no choices", response.id),
                source: None,
            })?;

        let text = choice.message.content.ok_or_else(|| ParleyError::Provider {
            message: format!(
                "completion {} has no content (finish_reason: {})",
                response.id,
                choice.finish_reason.as_deref().unwrap_or("none")
            ),
            source: None,
        })?;

        Ok(CompletionResponse {
            text,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: &Option<String>) -> Result<String, ParleyError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            ParleyError::Config(
                "OpenAI API key not found. Set openai.api_key in config or OPENAI_API_KEY environment variable.".into(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ConversationId;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str, system_prompt: Option<&str>) -> OpenAiProvider {
        let client = OpenAiClient::new("sk-test", base_url, Duration::from_secs(5))
            .unwrap()
            .with_retry_delay(Duration::from_millis(10));
        OpenAiProvider::with_client(
            client,
            "gpt-4o-mini".into(),
            256,
            system_prompt.map(str::to_string),
        )
    }

    fn request(messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            conversation_id: Some(ConversationId(42)),
            messages,
            system_prompt: None,
        }
    }

    #[test]
    fn resolve_api_key_from_config() {
        assert_eq!(resolve_api_key(&Some("sk-cfg".into())).unwrap(), "sk-cfg");
    }

    #[test]
    fn resolve_api_key_none_falls_back_to_env() {
        let result = resolve_api_key(&None);
        // Will succeed if env is set, fail otherwise.
        if let Err(err) = result {
            assert!(err.to_string().contains("API key not found"), "got: {err}");
        }
    }

    #[test]
    fn request_maps_roles_and_prepends_system_prompt() {
        let p = provider("http://unused", Some("Be brief."));
        let api = p.to_api_request(&request(vec![
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
            ChatMessage::user("How are you?"),
        ]));

        let roles: Vec<&str> = api.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(api.messages[0].content, "Be brief.");
        assert_eq!(api.model, "gpt-4o-mini");
        assert_eq!(api.max_tokens, Some(256));
        assert_eq!(api.user.as_deref(), Some("chat-42"));
    }

    #[test]
    fn request_system_prompt_overrides_default() {
        let p = provider("http://unused", Some("default"));
        let mut req = request(vec![ChatMessage::user("Hi")]);
        req.system_prompt = Some("override".into());
        let api = p.to_api_request(&req);
        assert_eq!(api.messages[0].content, "override");
        assert_eq!(api.messages.len(), 2);
    }

    #[test]
    fn blank_system_prompt_is_omitted() {
        let p = provider("http://unused", Some("   "));
        let api = p.to_api_request(&request(vec![ChatMessage::user("Hi")]));
        assert_eq!(api.messages.len(), 1);
        assert_eq!(api.messages[0].role, "user");
    }

    #[tokio::test]
    async fn complete_returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 8, "completion_tokens": 1, "total_tokens": 9}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri(), None);
        let resp = p.complete(request(vec![ChatMessage::user("Hi")])).await.unwrap();
        assert_eq!(resp.text, "Hello");
        assert_eq!(resp.model, "gpt-4o-mini-2024-07-18");
        assert_eq!(
            resp.usage,
            Some(TokenUsage {
                prompt_tokens: 8,
                completion_tokens: 1
            })
        );
    }

    #[tokio::test]
    async fn empty_choices_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-empty",
                "model": "gpt-4o-mini",
                "choices": []
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri(), None);
        let err = p.complete(request(vec![ChatMessage::user("Hi")])).await.unwrap_err();
        assert!(matches!(err, ParleyError::Provider { .. }));
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn null_content_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-null",
                "model": "gpt-4o-mini",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri(), None);
        let err = p.complete(request(vec![ChatMessage::user("Hi")])).await.unwrap_err();
        assert!(err.to_string().contains("content_filter"), "got: {err}");
    }

    #[tokio::test]
    async fn provider_identity() {
        let p = provider("http://unused", None);
        assert_eq!(p.name(), "openai");
        assert_eq!(p.adapter_type(), AdapterType::Provider);
        assert_eq!(p.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
