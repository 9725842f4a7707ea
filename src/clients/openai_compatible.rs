//! Shared OpenAI-compatible base client (C9), generalized from the
//! teacher's `groq.rs` template — every vendor that speaks the OpenAI
//! `/v1/chat/completions` dialect (OpenAI itself, Azure, Groq, OpenRouter,
//! xAI, DeepSeek, Mistral, DeepInfra, Cerebras, Together, Cohere,
//! Perplexity, Replicate, Cloudflare Workers AI, GitLab Duo, Google
//! Vertex's OpenAI-compat surface) constructs one of these parameterized
//! by `(provider_id, base_url, api_key, models)` rather than hand-writing
//! its own HTTP plumbing.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{classify, ProviderError};
use crate::message::{
    Content, ContentBlock, Message, MessageRequest, MessageResponse, RequestOptions, Role,
    StopReason, StreamChunk, Usage,
};
use crate::provider::Provider;
use crate::stream::{map_finish_reason, OpenAiStreamAssembler, SseLineBuffer};
use crate::transform::{
    drop_orphan_tool_results, insert_mistral_filler, normalize_tool_ids, resolve_reasoning_variant,
    resolve_temperature_top_p, tool_id_family, ReasoningVariant, ToolIdFamily,
};

pub struct OpenAiCompatibleClient {
    provider_id: String,
    base_url: String,
    api_key: String,
    http: Client,
    models: Vec<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        provider_id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: Client::new(),
            models,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn wire_request(&self, request: &MessageRequest, stream: bool, options: &RequestOptions) -> Value {
        let mut source_messages = request.messages.clone();
        drop_orphan_tool_results(&mut source_messages);
        let family = tool_id_family(&self.provider_id);
        if family != ToolIdFamily::Other {
            normalize_tool_ids(&mut source_messages, family);
        }
        if self.provider_id == "mistral" {
            insert_mistral_filler(&mut source_messages);
        }

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for m in &source_messages {
            messages.extend(wire_messages(m));
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "stream": stream,
        });
        let (temperature, top_p) =
            resolve_temperature_top_p(&request.model, request.temperature, request.top_p);
        if let Some(t) = temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = top_p {
            body["top_p"] = json!(p);
        }
        if let Some(ReasoningVariant::OpenAiEffort { effort }) =
            resolve_reasoning_variant(&self.provider_id, options)
        {
            body["reasoning_effort"] = json!(effort);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools
                .iter()
                .map(|t| json!({
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

    async fn send(&self, body: &Value) -> Result<Value, ProviderError> {
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
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

        serde_json::from_str(&text).map_err(|e| ProviderError::Network(e.to_string()))
    }
}

/// Synthesizes an id for a `tool_use` block the model emitted without one,
/// in the `call_<12-hex>` shape the OpenAI dialect expects.
fn synthesize_tool_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..12])
}

pub(crate) fn wire_messages(m: &Message) -> Vec<Value> {
    let role = match m.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };

    match &m.content {
        Content::Text(text) => vec![json!({"role": role, "content": text})],
        Content::Blocks(blocks) => {
            let mut out = Vec::new();
            let mut text_parts = Vec::new();
            let mut image_parts = Vec::new();
            let mut tool_calls = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::Text { text } => text_parts.push(text.clone()),
                    ContentBlock::Image { source } => {
                        let url = match source {
                            crate::message::ImageSource::Base64 { media_type, data } => {
                                format!("data:{media_type};base64,{data}")
                            }
                            crate::message::ImageSource::Url { url, .. } => url.clone(),
                        };
                        image_parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        if name.is_empty() {
                            continue;
                        }
                        let id = if id.is_empty() { synthesize_tool_call_id() } else { id.clone() };
                        tool_calls.push(json!({
                            "id": id,
                            "type": "function",
                            "function": {"name": name, "arguments": input.to_string()},
                        }));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => {
                        out.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content.as_text(),
                        }));
                    }
                    ContentBlock::Reasoning { .. } => {}
                }
            }

            if !image_parts.is_empty() {
                let mut parts: Vec<Value> = text_parts
                    .iter()
                    .map(|t| json!({"type": "text", "text": t}))
                    .collect();
                parts.extend(image_parts);
                out.insert(0, json!({"role": role, "content": parts}));
            } else if !text_parts.is_empty() || tool_calls.is_empty() {
                out.insert(0, json!({"role": role, "content": text_parts.join("")}));
            }

            if !tool_calls.is_empty() {
                out.insert(
                    0,
                    json!({"role": role, "content": Value::Null, "tool_calls": tool_calls}),
                );
            }

            out
        }
    }
}

pub(crate) fn parse_response(value: &Value) -> Result<MessageResponse, ProviderError> {
    let choice = value["choices"]
        .get(0)
        .ok_or_else(|| ProviderError::InvalidRequest("response had no choices".into()))?;
    let message = &choice["message"];

    let mut content = Vec::new();
    if let Some(text) = message["content"].as_str() {
        if !text.is_empty() {
            content.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
    }
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for tc in tool_calls {
            let name = tc["function"]["name"].as_str().unwrap_or_default().to_string();
            let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
            let input = serde_json::from_str(args_str).unwrap_or_else(|_| json!({}));
            content.push(ContentBlock::ToolUse {
                id: tc["id"].as_str().unwrap_or_default().to_string(),
                name,
                input,
            });
        }
    }

    let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop");
    let stop_reason = map_finish_reason(finish_reason);

    Ok(MessageResponse {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        model: value["model"].as_str().unwrap_or_default().to_string(),
        role: Role::Assistant,
        content,
        stop_reason,
        usage: Usage {
            input_tokens: value["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
            output_tokens: value["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            cache_read_tokens: None,
            cache_create_tokens: None,
        },
    })
}

#[async_trait]
impl Provider for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.provider_id
    }

    async fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn create_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        crate::retry::with_retry(&crate::retry::RetryConfig::default(), || async {
            let body = self.wire_request(&request, false, options);
            let value = self.send(&body).await?;
            parse_response(&value)
        })
        .await
    }

    async fn stream_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
        callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError> {
        use futures::StreamExt;

        let body = self.wire_request(&request, true, options);
        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
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
    use crate::message::{Tool, ToolResultContent};

    #[test]
    fn wire_request_includes_system_as_leading_message() {
        let client = OpenAiCompatibleClient::new("groq", "https://api.groq.com/openai/v1", "key", vec![]);
        let mut request = MessageRequest::new("llama", vec![Message::user("hi")], 100);
        request.system = Some("be terse".to_string());
        let body = client.wire_request(&request, false, &RequestOptions::default());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn tool_result_block_becomes_tool_role_message() {
        let msg = Message::blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: "call_1".into(),
                content: ToolResultContent::Text("42".into()),
                is_error: None,
            }],
        );
        let wire = wire_messages(&msg);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "call_1");
    }

    #[test]
    fn tool_use_block_becomes_assistant_tool_calls() {
        let msg = Message::blocks(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "get_time".into(),
                input: json!({}),
            }],
        );
        let wire = wire_messages(&msg);
        assert_eq!(wire[0]["role"], "assistant");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "get_time");
    }

    #[test]
    fn tool_use_block_with_missing_id_gets_synthesized_call_id() {
        let msg = Message::blocks(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: String::new(),
                name: "get_time".into(),
                input: json!({}),
            }],
        );
        let wire = wire_messages(&msg);
        let id = wire[0]["tool_calls"][0]["id"].as_str().unwrap();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), "call_".len() + 12);
    }

    #[test]
    fn tool_use_block_with_missing_name_is_dropped() {
        let msg = Message::blocks(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: String::new(),
                input: json!({}),
            }],
        );
        let wire = wire_messages(&msg);
        assert!(wire.iter().all(|m| m.get("tool_calls").is_none()));
    }

    #[test]
    fn wire_request_drops_orphan_tool_results() {
        let client = OpenAiCompatibleClient::new("groq", "https://x", "key", vec![]);
        let orphan = Message::blocks(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: "never_called".into(),
                content: ToolResultContent::Text("42".into()),
                is_error: None,
            }],
        );
        let request = MessageRequest::new("llama", vec![Message::user("hi"), orphan], 100);
        let body = client.wire_request(&request, false, &RequestOptions::default());
        let messages = body["messages"].as_array().unwrap();
        assert!(messages.iter().all(|m| m["role"] != "tool"));
    }

    #[test]
    fn wire_request_injects_reasoning_effort_for_openai_family() {
        let client = OpenAiCompatibleClient::new("openai", "https://api.openai.com/v1", "key", vec![]);
        let request = MessageRequest::new("gpt-5", vec![Message::user("hi")], 100);
        let options = RequestOptions {
            reasoning_effort: Some("medium".to_string()),
            ..Default::default()
        };
        let body = client.wire_request(&request, false, &options);
        assert_eq!(body["reasoning_effort"], "medium");
    }

    #[test]
    fn wire_request_omits_reasoning_effort_for_non_openai_family_providers() {
        let client = OpenAiCompatibleClient::new("groq", "https://x", "key", vec![]);
        let request = MessageRequest::new("llama", vec![Message::user("hi")], 100);
        let options = RequestOptions {
            reasoning_effort: Some("medium".to_string()),
            ..Default::default()
        };
        let body = client.wire_request(&request, false, &options);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn wire_request_falls_back_to_model_family_temperature_default() {
        let client = OpenAiCompatibleClient::new("openrouter", "https://x", "key", vec![]);
        let request = MessageRequest::new("qwen-72b", vec![Message::user("hi")], 100);
        let body = client.wire_request(&request, false, &RequestOptions::default());
        assert_eq!(body["temperature"], 0.55);
        assert_eq!(body["top_p"], 1.0);
    }

    #[test]
    fn wire_request_translates_tools() {
        let client = OpenAiCompatibleClient::new("groq", "https://x", "key", vec![]);
        let mut request = MessageRequest::new("llama", vec![Message::user("hi")], 100);
        request.tools = Some(vec![Tool {
            name: "get_time".into(),
            description: "returns time".into(),
            input_schema: json!({"type": "object", "properties": {}}),
        }]);
        let body = client.wire_request(&request, false, &RequestOptions::default());
        assert_eq!(body["tools"][0]["function"]["name"], "get_time");
    }

    #[test]
    fn parse_response_extracts_text_and_usage() {
        let raw = json!({
            "id": "chatcmpl-1",
            "model": "llama-3.3-70b-versatile",
            "choices": [{"message": {"role": "assistant", "content": "hi there"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3},
        });
        let parsed = parse_response(&raw).unwrap();
        assert_eq!(parsed.usage.input_tokens, 10);
        assert!(matches!(&parsed.content[0], ContentBlock::Text { text } if text == "hi there"));
        assert_eq!(parsed.stop_reason, StopReason::EndTurn);
    }

    #[test]
    fn parse_response_defaults_empty_tool_arguments_to_empty_object() {
        let raw = json!({
            "id": "x", "model": "m",
            "choices": [{"message": {"tool_calls": [{"id": "c1", "function": {"name": "f", "arguments": ""}}]}, "finish_reason": "tool_calls"}],
        });
        let parsed = parse_response(&raw).unwrap();
        assert!(matches!(&parsed.content[0], ContentBlock::ToolUse { input, .. } if input.is_object()));
    }
}
