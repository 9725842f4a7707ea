//! Message & schema transformer, grounded in the
//! teacher's `transform.rs` tool-id normalization and Gemini schema
//! sanitizer, trimmed to the operations this crate actually needs (the
//! teacher's npm/SDK-key/variant-options machinery targets a different,
//! richer surface and is not carried forward — see DESIGN.md).

use crate::message::{Content, ContentBlock, Message, RequestOptions, Role};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolIdFamily {
    AnthropicLike,
    Mistral,
    Other,
}

pub fn tool_id_family(provider_id: &str) -> ToolIdFamily {
    match provider_id {
        "anthropic" | "bedrock" | "copilot" => ToolIdFamily::AnthropicLike,
        "mistral" => ToolIdFamily::Mistral,
        _ => ToolIdFamily::Other,
    }
}

/// Empty-text filter (Anthropic/Bedrock, assistant role): drop text blocks
/// whose text is whitespace-only, then drop messages left with no blocks.
pub fn filter_empty_text_blocks(messages: &mut Vec<Message>) {
    for msg in messages.iter_mut() {
        if !matches!(msg.role, Role::Assistant) {
            continue;
        }
        if let Content::Blocks(blocks) = &mut msg.content {
            blocks.retain(|b| match b {
                ContentBlock::Text { text } => !text.trim().is_empty(),
                _ => true,
            });
        }
    }
    messages.retain(|msg| match &msg.content {
        Content::Text(t) => !t.trim().is_empty(),
        Content::Blocks(blocks) => !blocks.is_empty(),
    });
}

/// Anthropic/Bedrock/Copilot: replace every non-`[A-Za-z0-9_-]` character
/// with `_`. Idempotent by construction: the replacement alphabet is
/// exactly the set left unchanged.
pub fn normalize_tool_id_anthropic_like(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Mistral: strip to `[A-Za-z0-9]`, truncate to 9, right-pad with `0` to
/// exactly 9 characters.
pub fn normalize_tool_id_mistral(id: &str) -> String {
    let alnum: String = id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let truncated: String = alnum.chars().take(9).collect();
    format!("{truncated:0<9}")
}

pub fn normalize_tool_id(id: &str, family: ToolIdFamily) -> String {
    match family {
        ToolIdFamily::AnthropicLike => normalize_tool_id_anthropic_like(id),
        ToolIdFamily::Mistral => normalize_tool_id_mistral(id),
        ToolIdFamily::Other => id.to_string(),
    }
}

/// Apply tool-id normalization to every `tool_use`/`tool_result` block in
/// the conversation.
pub fn normalize_tool_ids(messages: &mut [Message], family: ToolIdFamily) {
    if family == ToolIdFamily::Other {
        return;
    }
    for msg in messages.iter_mut() {
        if let Content::Blocks(blocks) = &mut msg.content {
            for block in blocks.iter_mut() {
                match block {
                    ContentBlock::ToolUse { id, .. } => *id = normalize_tool_id(id, family),
                    ContentBlock::ToolResult { tool_use_id, .. } => {
                        *tool_use_id = normalize_tool_id(tool_use_id, family)
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Drop every `tool_result` that doesn't reference a `tool_use` id seen
/// earlier in the same conversation; orphans are dropped rather than
/// back-patched.
pub fn drop_orphan_tool_results(messages: &mut Vec<Message>) {
    let mut seen_ids = std::collections::HashSet::new();
    for msg in messages.iter_mut() {
        if let Content::Blocks(blocks) = &mut msg.content {
            for block in blocks.iter() {
                if let ContentBlock::ToolUse { id, .. } = block {
                    seen_ids.insert(id.clone());
                }
            }
            blocks.retain(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => seen_ids.contains(tool_use_id),
                _ => true,
            });
        }
    }
}

/// Mistral filler insertion: when two consecutive messages both have role
/// `user`, inject an assistant message between them.
pub fn insert_mistral_filler(messages: &mut Vec<Message>) {
    let mut i = 0;
    while i + 1 < messages.len() {
        if matches!(messages[i].role, Role::User) && matches!(messages[i + 1].role, Role::User) {
            messages.insert(i + 1, Message::assistant("I understand. Please continue."));
        }
        i += 1;
    }
}

/// Gemini schema rewrite: deep-copy `input_schema`; convert `enum`
/// containing non-string values to string-typed enum; ensure `array` has
/// `items` (default `{type:string}`); filter `required` to names that
/// exist in `properties`; recurse.
pub fn rewrite_schema_for_gemini(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut result: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), rewrite_schema_for_gemini(v)))
                .collect();

            if let Some(Value::Array(values)) = map.get("enum") {
                let all_string = values.iter().all(|v| v.is_string());
                if !all_string {
                    let stringified: Vec<Value> = values
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => Value::String(s.clone()),
                            other => Value::String(other.to_string()),
                        })
                        .collect();
                    result.insert("enum".to_string(), Value::Array(stringified));
                    result.insert("type".to_string(), json!("string"));
                }
            }

            if result.get("type") == Some(&json!("array")) && !result.contains_key("items") {
                result.insert("items".to_string(), json!({ "type": "string" }));
            }

            if let Some(Value::Array(required)) = result.get("required").cloned() {
                let empty_props = Map::new();
                let props = result
                    .get("properties")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty_props);
                let filtered: Vec<Value> = required
                    .into_iter()
                    .filter(|r| r.as_str().map_or(false, |name| props.contains_key(name)))
                    .collect();
                result.insert("required".to_string(), Value::Array(filtered));
            }

            Value::Object(result)
        }
        Value::Array(items) => Value::Array(items.iter().map(rewrite_schema_for_gemini).collect()),
        other => other.clone(),
    }
}

/// Reasoning effort levels a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
    Max,
}

/// `get_reasoning_variant(provider, effort)`: the request-body options to
/// inject for a given effort level, plus (for thinking-budget providers)
/// the budget itself so callers can apply the max-output arithmetic below.
#[derive(Debug)]
pub enum ReasoningVariant {
    AnthropicThinking { budget_tokens: u64 },
    OpenAiEffort { effort: &'static str },
    GoogleThinkingBudget { thinking_budget: u64 },
    Unsupported,
}

/// Parses a caller-supplied effort string (`RequestOptions::reasoning_effort`)
/// into the closed `ReasoningEffort` enum. Unrecognized strings are treated
/// as absent rather than erroring, since reasoning effort is an optional
/// hint, not a required field.
pub fn parse_reasoning_effort(raw: &str) -> Option<ReasoningEffort> {
    match raw.to_lowercase().as_str() {
        "low" => Some(ReasoningEffort::Low),
        "medium" => Some(ReasoningEffort::Medium),
        "high" => Some(ReasoningEffort::High),
        "max" => Some(ReasoningEffort::Max),
        _ => None,
    }
}

pub fn get_reasoning_variant(provider_id: &str, effort: ReasoningEffort) -> ReasoningVariant {
    match provider_id {
        "anthropic" | "bedrock" => {
            let budget = match effort {
                ReasoningEffort::Low => 5_000,
                ReasoningEffort::Medium => 10_000,
                ReasoningEffort::High => 32_000,
                ReasoningEffort::Max => 100_000,
            };
            ReasoningVariant::AnthropicThinking {
                budget_tokens: budget,
            }
        }
        "openai" | "xai" => {
            let effort_str = match effort {
                ReasoningEffort::Low => "low",
                ReasoningEffort::Medium => "medium",
                ReasoningEffort::High | ReasoningEffort::Max => "high",
            };
            ReasoningVariant::OpenAiEffort { effort: effort_str }
        }
        "google" => {
            let budget = match effort {
                ReasoningEffort::Low => 1_024,
                ReasoningEffort::Medium => 8_192,
                ReasoningEffort::High | ReasoningEffort::Max => 32_768,
            };
            ReasoningVariant::GoogleThinkingBudget {
                thinking_budget: budget,
            }
        }
        _ => ReasoningVariant::Unsupported,
    }
}

/// If a thinking budget is set, effective max_tokens is raised to
/// `budget + 4096` so the response has room after reasoning.
pub fn max_tokens_with_thinking_budget(requested: u64, budget_tokens: u64) -> u64 {
    requested.max(budget_tokens + 4096)
}

/// Resolves the reasoning variant a wire builder should inject for this
/// call: `None` if the caller gave no effort hint or the backend doesn't
/// parse it, or if the provider has no reasoning-variant support.
pub fn resolve_reasoning_variant(provider_id: &str, options: &RequestOptions) -> Option<ReasoningVariant> {
    let effort = options
        .reasoning_effort
        .as_deref()
        .and_then(parse_reasoning_effort)?;
    match get_reasoning_variant(provider_id, effort) {
        ReasoningVariant::Unsupported => None,
        variant => Some(variant),
    }
}

/// Resolves the wire-level temperature/top_p pair: explicit request values
/// win, otherwise fall back to the model family default.
pub fn resolve_temperature_top_p(
    model_id: &str,
    requested_temperature: Option<f32>,
    requested_top_p: Option<f32>,
) -> (Option<f32>, Option<f32>) {
    if requested_temperature.is_some() || requested_top_p.is_some() {
        return (requested_temperature, requested_top_p);
    }
    default_temperature_top_p(model_id)
}

/// Default temperature/top_p by model-family substring. A temperature of
/// zero means "do not send the field" — callers that receive `Some(0.0)`
/// here should omit the field entirely, same as `None`.
pub fn default_temperature_top_p(model_id: &str) -> (Option<f32>, Option<f32>) {
    let id = model_id.to_lowercase();
    if id.contains("qwen") {
        return (Some(0.55), Some(1.0));
    }
    if id.contains("gemini") || id.contains("glm") || id.contains("minimax") || id.contains("kimi") {
        return (Some(1.0), Some(0.95));
    }
    if id.contains("claude") {
        return (None, None);
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    #[test]
    fn anthropic_tool_id_normalization_is_idempotent() {
        let raw = "call/tool#1!";
        let once = normalize_tool_id(raw, ToolIdFamily::AnthropicLike);
        let twice = normalize_tool_id(&once, ToolIdFamily::AnthropicLike);
        assert_eq!(once, twice);
    }

    #[test]
    fn mistral_tool_id_normalization_is_idempotent() {
        let raw = "call_abc123xyz!!!";
        let once = normalize_tool_id(raw, ToolIdFamily::Mistral);
        let twice = normalize_tool_id(&once, ToolIdFamily::Mistral);
        assert_eq!(once, twice);
    }

    #[test]
    fn mistral_tool_ids_are_exactly_nine_alnum_chars() {
        let re = regex::Regex::new(r"^[A-Za-z0-9]{9}$").unwrap();
        for raw in ["call_x", "call_1234567890abcdef", "!!!", ""] {
            let normalized = normalize_tool_id_mistral(raw);
            assert_eq!(normalized.len(), 9);
            assert!(re.is_match(&normalized), "{normalized:?} for input {raw:?}");
        }
    }

    #[test]
    fn mistral_filler_inserted_between_consecutive_user_messages() {
        let mut messages = vec![Message::user("first"), Message::user("second")];
        insert_mistral_filler(&mut messages);
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[1].role, Role::Assistant));
    }

    #[test]
    fn gemini_schema_rewrite_stringifies_enums_and_fills_array_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "n": {"type": "integer", "enum": [1, 2, 3]},
                "items": {"type": "array"}
            },
            "required": ["n", "missing"]
        });
        let rewritten = rewrite_schema_for_gemini(&schema);
        assert_eq!(rewritten["properties"]["n"]["enum"], json!(["1", "2", "3"]));
        assert_eq!(rewritten["properties"]["n"]["type"], json!("string"));
        assert_eq!(rewritten["properties"]["items"]["items"], json!({"type": "string"}));
        assert_eq!(rewritten["required"], json!(["n"]));
    }

    #[test]
    fn drops_orphan_tool_results() {
        let mut messages = vec![Message::blocks(
            Role::Assistant,
            vec![ContentBlock::ToolResult {
                tool_use_id: "dangling".into(),
                content: crate::message::ToolResultContent::Text("x".into()),
                is_error: None,
            }],
        )];
        drop_orphan_tool_results(&mut messages);
        assert!(matches!(&messages[0].content, Content::Blocks(b) if b.is_empty()));
    }

    #[test]
    fn reasoning_variant_anthropic_budgets_scale_with_effort() {
        for (effort, expected) in [
            (ReasoningEffort::Low, 5_000),
            (ReasoningEffort::Medium, 10_000),
            (ReasoningEffort::High, 32_000),
            (ReasoningEffort::Max, 100_000),
        ] {
            match get_reasoning_variant("anthropic", effort) {
                ReasoningVariant::AnthropicThinking { budget_tokens } => {
                    assert_eq!(budget_tokens, expected)
                }
                _ => panic!("expected AnthropicThinking"),
            }
        }
    }

    #[test]
    fn max_tokens_raised_to_cover_thinking_budget() {
        assert_eq!(max_tokens_with_thinking_budget(1000, 32_000), 36_096);
        assert_eq!(max_tokens_with_thinking_budget(50_000, 5_000), 50_000);
    }

    #[test]
    fn default_temperature_top_p_varies_by_model_family() {
        assert_eq!(default_temperature_top_p("qwen-72b"), (Some(0.55), Some(1.0)));
        assert_eq!(default_temperature_top_p("gemini-2.0-flash"), (Some(1.0), Some(0.95)));
        assert_eq!(default_temperature_top_p("claude-sonnet-4-5"), (None, None));
    }

    #[test]
    fn resolve_temperature_top_p_prefers_explicit_request_values() {
        assert_eq!(
            resolve_temperature_top_p("qwen-72b", Some(0.2), None),
            (Some(0.2), None)
        );
        assert_eq!(
            resolve_temperature_top_p("qwen-72b", None, None),
            (Some(0.55), Some(1.0))
        );
    }

    #[test]
    fn resolve_reasoning_variant_returns_none_without_a_parseable_effort() {
        let options = RequestOptions::default();
        assert!(resolve_reasoning_variant("anthropic", &options).is_none());

        let options = RequestOptions {
            reasoning_effort: Some("not-a-real-effort".to_string()),
            ..Default::default()
        };
        assert!(resolve_reasoning_variant("anthropic", &options).is_none());
    }

    #[test]
    fn resolve_reasoning_variant_parses_effort_and_looks_up_the_provider() {
        let options = RequestOptions {
            reasoning_effort: Some("HIGH".to_string()),
            ..Default::default()
        };
        match resolve_reasoning_variant("anthropic", &options) {
            Some(ReasoningVariant::AnthropicThinking { budget_tokens }) => {
                assert_eq!(budget_tokens, 32_000)
            }
            other => panic!("expected AnthropicThinking, got {other:?}"),
        }
    }

    #[test]
    fn resolve_reasoning_variant_is_unsupported_for_unlisted_providers() {
        let options = RequestOptions {
            reasoning_effort: Some("high".to_string()),
            ..Default::default()
        };
        assert!(resolve_reasoning_variant("groq", &options).is_none());
    }
}
