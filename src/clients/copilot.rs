//! Native GitHub Copilot client, narrowed from the
//! teacher's `github_copilot.rs` (which dual-routes Responses/Legacy APIs)
//! to the single Legacy-shaped `chat/completions` endpoint, with the
//! product-identification headers the backend checks and full cross-chunk
//! `tool_calls[].function.arguments` accumulation.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::RwLock;

use crate::clients::openai_compatible::{parse_response, wire_messages};
use crate::error::{classify, ProviderError};
use crate::message::{Message, MessageRequest, MessageResponse, RequestOptions, StreamChunk};
use crate::provider::Provider;
use crate::stream::{OpenAiStreamAssembler, SseLineBuffer};
use crate::transform::{
    drop_orphan_tool_results, filter_empty_text_blocks, normalize_tool_ids, resolve_reasoning_variant,
    resolve_temperature_top_p, ReasoningVariant, ToolIdFamily,
};

const ENDPOINT: &str = "https://api.individual.githubcopilot.com/chat/completions";
const MODELS_ENDPOINT: &str = "https://api.individual.githubcopilot.com/models";
const EDITOR_VERSION: &str = "vscode/1.90.0";
const COPILOT_INTEGRATION_ID: &str = "vscode-chat";

/// Static fallback used when the `/models` fetch fails.
const FALLBACK_MODELS: &[&str] = &["gpt-5", "claude-sonnet-4.5", "gpt-4o"];

pub struct CopilotClient {
    oauth_token: String,
    http: Client,
    models_cache: RwLock<Option<Vec<String>>>,
}

impl CopilotClient {
    pub fn new(oauth_token: impl Into<String>) -> Self {
        Self {
            oauth_token: oauth_token.into(),
            http: Client::new(),
            models_cache: RwLock::new(None),
        }
    }

    fn headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.oauth_token)
            .header("content-type", "application/json")
            .header("editor-version", EDITOR_VERSION)
            .header("copilot-integration-id", COPILOT_INTEGRATION_ID)
            .header("openai-intent", "conversation-panel")
    }

    async fn fetch_models(&self) -> Vec<String> {
        let result = self
            .headers(self.http.get(MODELS_ENDPOINT))
            .send()
            .await;

        let Ok(resp) = result else {
            return FALLBACK_MODELS.iter().map(|s| s.to_string()).collect();
        };
        if !resp.status().is_success() {
            return FALLBACK_MODELS.iter().map(|s| s.to_string()).collect();
        }
        let Ok(body) = resp.json::<CopilotModelsResponse>().await else {
            return FALLBACK_MODELS.iter().map(|s| s.to_string()).collect();
        };

        let mut ids: Vec<String> = body
            .data
            .into_iter()
            .filter(|m| {
                let policy_ok = m.policy.as_ref().map(|p| p.state == "enabled").unwrap_or(true);
                let endpoint_ok = m
                    .supported_endpoints
                    .as_ref()
                    .map(|eps| eps.iter().any(|e| e == "/chat/completions"))
                    .unwrap_or(true);
                policy_ok && endpoint_ok
            })
            .map(|m| m.id)
            .collect();
        ids.sort();
        ids.dedup();

        if ids.is_empty() {
            FALLBACK_MODELS.iter().map(|s| s.to_string()).collect()
        } else {
            ids
        }
    }

    async fn create_message_once(
        &self,
        request: &MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        let body = wire_request(request, false, options);
        let resp = self
            .headers(self.http.post(ENDPOINT))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = resp.status();
        let retry_after = crate::error::retry_after_header(resp.headers());
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(classify(Some(status.as_u16()), &text, None, retry_after.as_deref()).into());
        }
        let value: Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Network(e.to_string()))?;
        parse_response(&value)
    }
}

#[derive(Debug, Deserialize)]
struct CopilotModelsResponse {
    data: Vec<CopilotModel>,
}

#[derive(Debug, Deserialize)]
struct CopilotModel {
    id: String,
    #[serde(default)]
    policy: Option<CopilotModelPolicy>,
    #[serde(default)]
    supported_endpoints: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct CopilotModelPolicy {
    state: String,
}

fn wire_request(request: &MessageRequest, stream: bool, options: &RequestOptions) -> Value {
    let mut source_messages = request.messages.clone();
    filter_empty_text_blocks(&mut source_messages);
    drop_orphan_tool_results(&mut source_messages);
    normalize_tool_ids(&mut source_messages, ToolIdFamily::AnthropicLike);

    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    for m in &source_messages {
        messages.extend(wire_messages(m));
    }
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "stream": stream,
    });
    let (temperature, top_p) =
        resolve_temperature_top_p(&request.model, request.temperature, request.top_p);
    if let Some(t) = temperature {
        body["temperature"] = serde_json::json!(t);
    }
    if let Some(p) = top_p {
        body["top_p"] = serde_json::json!(p);
    }
    if let Some(ReasoningVariant::OpenAiEffort { effort }) =
        resolve_reasoning_variant("copilot", options)
    {
        body["reasoning_effort"] = serde_json::json!(effort);
    }
    if let Some(tools) = &request.tools {
        body["tools"] = serde_json::json!(tools
            .iter()
            .map(|t| serde_json::json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            }))
            .collect::<Vec<_>>());
    }
    body
}

#[async_trait]
impl Provider for CopilotClient {
    fn name(&self) -> &str {
        "copilot"
    }

    async fn models(&self) -> Vec<String> {
        if let Some(cached) = self.models_cache.read().unwrap().clone() {
            return cached;
        }
        let fetched = self.fetch_models().await;
        *self.models_cache.write().unwrap() = Some(fetched.clone());
        fetched
    }

    async fn create_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        crate::retry::with_retry(&crate::retry::RetryConfig::default(), || {
            self.create_message_once(&request, options)
        })
        .await
    }

    async fn stream_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
        callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError> {
        let body = wire_request(&request, true, options);
        let resp = self
            .headers(self.http.post(ENDPOINT))
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let retry_after = crate::error::retry_after_header(resp.headers());
            let text = resp.text().await.unwrap_or_default();
            return Err(classify(Some(status.as_u16()), &text, None, retry_after.as_deref()).into());
        }

        let mut assembler = OpenAiStreamAssembler::new();
        let mut buffer = SseLineBuffer::default();
        let mut byte_stream = resp.bytes_stream();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            for line in buffer.push(&bytes) {
                let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                    continue;
                };
                for chunk in assembler.feed(data) {
                    callback(chunk)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_filter_keeps_enabled_chat_completions_models() {
        let json = serde_json::json!({
            "data": [
                {"id": "gpt-5", "policy": {"state": "enabled"}, "supported_endpoints": ["/chat/completions"]},
                {"id": "blocked-model", "policy": {"state": "disabled"}, "supported_endpoints": ["/chat/completions"]},
                {"id": "no-chat-endpoint", "supported_endpoints": ["/responses"]},
                {"id": "no-policy-field"},
            ]
        });
        let parsed: CopilotModelsResponse = serde_json::from_value(json).unwrap();
        let kept: Vec<String> = parsed
            .data
            .into_iter()
            .filter(|m| {
                let policy_ok = m.policy.as_ref().map(|p| p.state == "enabled").unwrap_or(true);
                let endpoint_ok = m
                    .supported_endpoints
                    .as_ref()
                    .map(|eps| eps.iter().any(|e| e == "/chat/completions"))
                    .unwrap_or(true);
                policy_ok && endpoint_ok
            })
            .map(|m| m.id)
            .collect();
        assert!(kept.contains(&"gpt-5".to_string()));
        assert!(kept.contains(&"no-policy-field".to_string()));
        assert!(!kept.contains(&"blocked-model".to_string()));
        assert!(!kept.contains(&"no-chat-endpoint".to_string()));
    }

    #[test]
    fn wire_request_sets_model_and_stream_flag() {
        let request = MessageRequest::new("gpt-5", vec![Message::user("hi")], 100);
        let body = wire_request(&request, true, &RequestOptions::default());
        assert_eq!(body["model"], "gpt-5");
        assert_eq!(body["stream"], true);
    }
}
