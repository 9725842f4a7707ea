//! Native Anthropic client, grounded in the teacher's
//! `anthropic.rs` reqwest/SSE shape but replacing API-key auth with the
//! OAuth bearer headers the OAuth-accepting Messages endpoint requires.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{classify, ProviderError};
use crate::message::{
    Content, ContentBlock, ImageSource, Message, MessageRequest, MessageResponse, RequestOptions,
    Role, StopReason, StreamChunk, ToolResultContent, Usage,
};
use crate::provider::Provider;
use crate::stream::{parse_anthropic_sse, SseLineBuffer};
use crate::transform::{
    drop_orphan_tool_results, filter_empty_text_blocks, max_tokens_with_thinking_budget,
    normalize_tool_ids, resolve_reasoning_variant, resolve_temperature_top_p, ReasoningVariant,
    ToolIdFamily,
};

const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_BETA: &str = "oauth-2025-04-20";
const USER_AGENT: &str = "claude-cli/1.0 (external, cli)";

pub struct AnthropicClient {
    oauth_token: String,
    http: Client,
}

impl AnthropicClient {
    pub fn new(oauth_token: impl Into<String>) -> Self {
        Self {
            oauth_token: oauth_token.into(),
            http: Client::new(),
        }
    }

    fn request_builder(&self, stream: bool) -> reqwest::RequestBuilder {
        self.http
            .post(ENDPOINT)
            .bearer_auth(&self.oauth_token)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("anthropic-beta", ANTHROPIC_BETA)
            .header("user-agent", USER_AGENT)
            .header("content-type", "application/json")
            .header(
                "accept",
                if stream { "text/event-stream" } else { "application/json" },
            )
    }

    async fn create_message_once(
        &self,
        request: &MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        let body = wire_request(request, false, options);
        let resp = self
            .request_builder(false)
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
        Ok(parse_response(&value))
    }
}

pub(crate) fn wire_content_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { source } => json!({"type": "image", "source": wire_image_source(source)}),
        ContentBlock::ToolUse { id, name, input } => {
            json!({"type": "tool_use", "id": id, "name": name, "input": input})
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let mut value = json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": wire_tool_result_content(content),
            });
            if let Some(err) = is_error {
                value["is_error"] = json!(err);
            }
            value
        }
        ContentBlock::Reasoning { reasoning } => json!({"type": "thinking", "thinking": reasoning}),
    }
}

pub(crate) fn wire_image_source(source: &ImageSource) -> Value {
    match source {
        ImageSource::Base64 { media_type, data } => {
            json!({"type": "base64", "media_type": media_type, "data": data})
        }
        ImageSource::Url { media_type, url } => {
            json!({"type": "url", "media_type": media_type, "url": url})
        }
    }
}

pub(crate) fn wire_tool_result_content(content: &ToolResultContent) -> Value {
    match content {
        ToolResultContent::Text(t) => json!(t),
        ToolResultContent::Json(v) => v.clone(),
    }
}

pub(crate) fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "user", // system content is hoisted to the top-level `system` field
    };
    let content = match &message.content {
        Content::Text(text) => json!(text),
        Content::Blocks(blocks) => json!(blocks.iter().map(wire_content_block).collect::<Vec<_>>()),
    };
    json!({"role": role, "content": content})
}

/// Builds the Anthropic-native body shared by the direct Anthropic client
/// and Bedrock's raw-invoke body (which adds `anthropic_version` in place
/// of `model`+`stream`, since those are carried by the URL path and route
/// choice instead). Reused by `clients::bedrock`. `provider_id` selects
/// which reasoning-variant table entry applies (`"anthropic"` vs
/// `"bedrock"`), since the two wire-compatible backends have distinct ids.
pub(crate) fn wire_body_common(
    provider_id: &str,
    request: &MessageRequest,
    options: &RequestOptions,
) -> Value {
    let mut messages = request.messages.clone();
    filter_empty_text_blocks(&mut messages);
    drop_orphan_tool_results(&mut messages);
    normalize_tool_ids(&mut messages, ToolIdFamily::AnthropicLike);

    let mut max_tokens = request.max_tokens;
    let mut body = json!({
        "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    let (temperature, top_p) =
        resolve_temperature_top_p(&request.model, request.temperature, request.top_p);
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = top_p {
        body["top_p"] = json!(p);
    }
    if let Some(ReasoningVariant::AnthropicThinking { budget_tokens }) =
        resolve_reasoning_variant(provider_id, options)
    {
        body["thinking"] = json!({"type": "enabled", "budget_tokens": budget_tokens});
        max_tokens = max_tokens_with_thinking_budget(max_tokens, budget_tokens);
    }
    body["max_tokens"] = json!(max_tokens);
    if let Some(tools) = &request.tools {
        body["tools"] = json!(tools
            .iter()
            .map(|t| json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            }))
            .collect::<Vec<_>>());
    }
    body
}

fn wire_request(request: &MessageRequest, stream: bool, options: &RequestOptions) -> Value {
    let mut body = wire_body_common("anthropic", request, options);
    body["model"] = json!(request.model);
    body["stream"] = json!(stream);
    body
}

pub(crate) fn parse_stop_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("end_turn") | Some("stop_sequence") => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("tool_use") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

pub(crate) fn parse_content_block(value: &Value) -> Option<ContentBlock> {
    match value["type"].as_str()? {
        "text" => Some(ContentBlock::Text {
            text: value["text"].as_str().unwrap_or_default().to_string(),
        }),
        "tool_use" => Some(ContentBlock::ToolUse {
            id: value["id"].as_str().unwrap_or_default().to_string(),
            name: value["name"].as_str().unwrap_or_default().to_string(),
            input: value["input"].clone(),
        }),
        "thinking" => Some(ContentBlock::Reasoning {
            reasoning: value["thinking"].as_str().unwrap_or_default().to_string(),
        }),
        _ => None,
    }
}

pub(crate) fn parse_response(value: &Value) -> MessageResponse {
    let content = value["content"]
        .as_array()
        .map(|arr| arr.iter().filter_map(parse_content_block).collect())
        .unwrap_or_default();

    MessageResponse {
        id: value["id"].as_str().unwrap_or_default().to_string(),
        model: value["model"].as_str().unwrap_or_default().to_string(),
        role: Role::Assistant,
        content,
        stop_reason: parse_stop_reason(value["stop_reason"].as_str()),
        usage: Usage {
            input_tokens: value["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: value["usage"]["output_tokens"].as_u64().unwrap_or(0),
            cache_read_tokens: value["usage"]["cache_read_input_tokens"].as_u64(),
            cache_create_tokens: value["usage"]["cache_creation_input_tokens"].as_u64(),
        },
    }
}

#[async_trait]
impl Provider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn models(&self) -> Vec<String> {
        vec![
            "claude-sonnet-4-5".to_string(),
            "claude-haiku-4-5".to_string(),
        ]
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
            .request_builder(true)
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

        let mut buffer = SseLineBuffer::default();
        let mut byte_stream = resp.bytes_stream();
        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            for line in buffer.push(&bytes) {
                let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                    continue;
                };
                if let Some(chunk) = parse_anthropic_sse(data) {
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
    use crate::message::Tool;

    #[test]
    fn system_message_is_hoisted_not_inlined_as_role() {
        let mut request = MessageRequest::new("claude-sonnet-4-5", vec![Message::user("hi")], 100);
        request.system = Some("be terse".to_string());
        let body = wire_request(&request, false, &RequestOptions::default());
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tool_definitions_translate_without_type_wrapper() {
        let mut request = MessageRequest::new("claude-sonnet-4-5", vec![Message::user("hi")], 100);
        request.tools = Some(vec![Tool {
            name: "get_time".into(),
            description: "returns time".into(),
            input_schema: json!({"type": "object"}),
        }]);
        let body = wire_request(&request, false, &RequestOptions::default());
        assert_eq!(body["tools"][0]["name"], "get_time");
        assert!(body["tools"][0].get("type").is_none());
    }

    #[test]
    fn high_reasoning_effort_adds_thinking_block_and_raises_max_tokens() {
        let request = MessageRequest::new("claude-sonnet-4-5", vec![Message::user("hi")], 1000);
        let options = RequestOptions {
            reasoning_effort: Some("high".to_string()),
            ..Default::default()
        };
        let body = wire_request(&request, false, &options);
        assert_eq!(body["thinking"]["type"], "enabled");
        assert_eq!(body["thinking"]["budget_tokens"], 32_000);
        assert_eq!(body["max_tokens"], 36_096);
    }

    #[test]
    fn no_reasoning_effort_omits_thinking_block() {
        let request = MessageRequest::new("claude-sonnet-4-5", vec![Message::user("hi")], 1000);
        let body = wire_request(&request, false, &RequestOptions::default());
        assert!(body.get("thinking").is_none());
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn parse_response_extracts_tool_use_and_usage() {
        let raw = json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-5",
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "get_time", "input": {}}],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 4},
        });
        let parsed = parse_response(&raw);
        assert_eq!(parsed.stop_reason, StopReason::ToolUse);
        assert!(matches!(&parsed.content[0], ContentBlock::ToolUse { name, .. } if name == "get_time"));
    }

    #[test]
    fn image_block_translates_base64_source() {
        let block = ContentBlock::Image {
            source: ImageSource::Base64 {
                media_type: "image/png".into(),
                data: "AAA".into(),
            },
        };
        let wire = wire_content_block(&block);
        assert_eq!(wire["source"]["type"], "base64");
        assert_eq!(wire["source"]["media_type"], "image/png");
    }
}
