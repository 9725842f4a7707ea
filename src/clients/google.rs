//! Native Google Gemini client, extended from the
//! teacher's text-only `google.rs` with multimodal parts, function
//! call/response parts, the Gemini schema rewrite (C10), and synthetic
//! tool-use ids (Gemini omits them on its own responses).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{classify, ProviderError};
use crate::message::{
    Content, ContentBlock, ImageSource, Message, MessageRequest, MessageResponse, RequestOptions,
    Role, StopReason, StreamChunk, ToolResultContent, Usage,
};
use crate::provider::Provider;
use crate::transform::{
    resolve_reasoning_variant, resolve_temperature_top_p, rewrite_schema_for_gemini,
    ReasoningVariant,
};

fn endpoint(model: &str, api_key: &str) -> String {
    format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={api_key}"
    )
}

pub struct GoogleClient {
    api_key: String,
    http: Client,
}

impl GoogleClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Client::new(),
        }
    }

    async fn create_message_once(
        &self,
        request: &MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError> {
        let url = endpoint(&request.model, &self.api_key);
        let body = wire_request(request, options);
        let resp = self
            .http
            .post(&url)
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
        let mut parsed = parse_response(&value);
        parsed.model = request.model.clone();
        Ok(parsed)
    }
}

fn wire_part(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"text": text}),
        ContentBlock::Image { source } => match source {
            ImageSource::Base64 { media_type, data } => {
                json!({"inlineData": {"mimeType": media_type, "data": data}})
            }
            ImageSource::Url { media_type, url } => {
                json!({"inlineData": {"mimeType": media_type, "data": url}})
            }
        },
        ContentBlock::ToolUse { name, input, .. } => {
            json!({"functionCall": {"name": name, "args": input}})
        }
        ContentBlock::ToolResult {
            content, ..
        } => {
            let response = match content {
                ToolResultContent::Text(t) => json!({"content": t}),
                ToolResultContent::Json(v) => json!({"content": v}),
            };
            // Gemini's functionResponse needs the originating function name,
            // which canonical ToolResult blocks don't carry; callers that
            // round-trip through Gemini must track id→name themselves (see
            // DESIGN.md open question).
            json!({"functionResponse": {"name": "tool", "response": response}})
        }
        ContentBlock::Reasoning { reasoning } => json!({"text": reasoning}),
    }
}

fn wire_message(message: &Message) -> Value {
    let role = match message.role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    };
    let parts = match &message.content {
        Content::Text(text) => vec![json!({"text": text})],
        Content::Blocks(blocks) => blocks.iter().map(wire_part).collect(),
    };
    json!({"role": role, "parts": parts})
}

fn wire_request(request: &MessageRequest, options: &RequestOptions) -> Value {
    let mut max_output_tokens = request.max_tokens;
    let mut body = json!({
        "contents": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
        "generationConfig": {},
    });
    let (temperature, top_p) =
        resolve_temperature_top_p(&request.model, request.temperature, request.top_p);
    if let Some(t) = temperature {
        body["generationConfig"]["temperature"] = json!(t);
    }
    if let Some(p) = top_p {
        body["generationConfig"]["topP"] = json!(p);
    }
    if let Some(ReasoningVariant::GoogleThinkingBudget { thinking_budget }) =
        resolve_reasoning_variant("google", options)
    {
        body["generationConfig"]["thinkingConfig"] = json!({"thinkingBudget": thinking_budget});
        max_output_tokens =
            crate::transform::max_tokens_with_thinking_budget(max_output_tokens, thinking_budget);
    }
    body["generationConfig"]["maxOutputTokens"] = json!(max_output_tokens);
    if let Some(system) = &request.system {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    if let Some(tools) = &request.tools {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": rewrite_schema_for_gemini(&t.input_schema),
                })
            })
            .collect();
        body["tools"] = json!([{"functionDeclarations": declarations}]);
    }
    body
}

fn parse_stop_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("STOP") => StopReason::EndTurn,
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

fn parse_response(value: &Value) -> MessageResponse {
    let candidate = &value["candidates"][0];
    let parts = candidate["content"]["parts"].as_array().cloned().unwrap_or_default();

    let mut content = Vec::new();
    let mut tool_use_counter = 0usize;
    for part in &parts {
        if let Some(text) = part["text"].as_str() {
            content.push(ContentBlock::Text { text: text.to_string() });
        } else if let Some(call) = part.get("functionCall") {
            let id = format!("call_{tool_use_counter}");
            tool_use_counter += 1;
            content.push(ContentBlock::ToolUse {
                id,
                name: call["name"].as_str().unwrap_or_default().to_string(),
                input: call["args"].clone(),
            });
        }
    }

    let has_tool_use = content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let stop_reason = if has_tool_use {
        StopReason::ToolUse
    } else {
        parse_stop_reason(candidate["finishReason"].as_str())
    };

    MessageResponse {
        id: String::new(), // Gemini responses carry no response-level id
        model: String::new(),
        role: Role::Assistant,
        content,
        stop_reason,
        usage: Usage {
            input_tokens: value["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0),
            output_tokens: value["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0),
            cache_read_tokens: None,
            cache_create_tokens: None,
        },
    }
}

#[async_trait]
impl Provider for GoogleClient {
    fn name(&self) -> &str {
        "google"
    }

    async fn models(&self) -> Vec<String> {
        vec![
            "gemini-2.5-pro".to_string(),
            "gemini-2.5-flash".to_string(),
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

    /// Gemini streaming is emulated by calling the non-streaming endpoint
    /// and synthesizing the canonical chunk sequence (real SSE streaming
    /// against Gemini's `:streamGenerateContent` route is not implemented).
    async fn stream_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
        callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError> {
        let response = self.create_message(request, options).await?;

        callback(StreamChunk::MessageStart {
            message: crate::message::MessageStartInfo {
                id: response.id.clone(),
                model: response.model.clone(),
                role: Role::Assistant,
            },
        })?;

        for (index, block) in response.content.iter().enumerate() {
            let start = match block {
                ContentBlock::Text { text } => {
                    crate::message::ContentBlockStart::Text { text: text.clone() }
                }
                ContentBlock::ToolUse { id, name, .. } => {
                    crate::message::ContentBlockStart::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                    }
                }
                _ => continue,
            };
            callback(StreamChunk::ContentBlockStart {
                index,
                content_block: start,
            })?;
            callback(StreamChunk::ContentBlockStop { index })?;
        }

        callback(StreamChunk::MessageDelta {
            usage: response.usage.clone(),
        })?;
        callback(StreamChunk::MessageStop)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_role_becomes_model() {
        let msg = Message::assistant("hi");
        let wire = wire_message(&msg);
        assert_eq!(wire["role"], "model");
    }

    #[test]
    fn system_prompt_becomes_system_instruction() {
        let mut request = MessageRequest::new("gemini-2.5-pro", vec![Message::user("hi")], 100);
        request.system = Some("be terse".to_string());
        let body = wire_request(&request, &RequestOptions::default());
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
    }

    #[test]
    fn high_reasoning_effort_sets_thinking_budget_and_raises_max_output_tokens() {
        let request = MessageRequest::new("gemini-2.5-pro", vec![Message::user("hi")], 1000);
        let options = RequestOptions {
            reasoning_effort: Some("high".to_string()),
            ..Default::default()
        };
        let body = wire_request(&request, &options);
        let budget = body["generationConfig"]["thinkingConfig"]["thinkingBudget"]
            .as_u64()
            .unwrap();
        assert!(budget > 0);
        assert_eq!(
            body["generationConfig"]["maxOutputTokens"].as_u64().unwrap(),
            budget + 4096
        );
    }

    #[test]
    fn stop_finish_reason_maps_to_end_turn() {
        assert_eq!(parse_stop_reason(Some("STOP")), StopReason::EndTurn);
    }

    #[test]
    fn synthetic_tool_ids_assigned_in_order() {
        let raw = json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "a", "args": {}}},
                    {"functionCall": {"name": "b", "args": {}}},
                ]},
                "finishReason": "STOP",
            }],
        });
        let parsed = parse_response(&raw);
        let ids: Vec<&str> = parsed
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::ToolUse { id, .. } => id.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(ids, vec!["call_0", "call_1"]);
        assert_eq!(parsed.stop_reason, StopReason::ToolUse);
    }
}
