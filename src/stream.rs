//! Server-sent-event parsing and streaming assembly, grounded in the
//! teacher's `stream.rs` (SSE line framing, cross-chunk tool-call id
//! handling) but remapped to the crate's canonical `StreamChunk` shape
//! instead of the teacher's own `StreamEvent` enum.

use serde::Deserialize;
use serde_json::Value;

use crate::message::{ContentBlockStart, ContentDelta, MessageStartInfo, Role, StreamChunk, Usage};

/// Split a raw SSE byte chunk into `data: ...` payload lines, matching the
/// teacher's line-at-a-time scan (a chunk may contain zero, one, or many
/// complete `data:` lines; partial lines at a chunk boundary are the
/// caller's responsibility to buffer — see `SseLineBuffer`).
pub fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
}

/// Buffers partial lines across chunk boundaries, since `bytes_stream()`
/// chunks don't align with SSE event boundaries.
#[derive(Default)]
pub struct SseLineBuffer {
    partial: String,
}

impl SseLineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.push_str(&String::from_utf8_lossy(bytes));
        let mut complete = Vec::new();
        while let Some(pos) = self.partial.find('\n') {
            let line = self.partial[..pos].trim_end_matches('\r').to_string();
            complete.push(line);
            self.partial.drain(..=pos);
        }
        complete
    }
}

// ---------------------------------------------------------------------------
// Anthropic-dialect SSE → canonical StreamChunk (identity mapping, since the
// canonical model is Anthropic-shaped).
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: AnthropicMessageStart },
    #[serde(rename = "content_block_start")]
    ContentBlockStart {
        index: usize,
        content_block: AnthropicBlockStart,
    },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: AnthropicDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: usize },
    #[serde(rename = "message_delta")]
    MessageDelta { usage: Option<AnthropicUsage> },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageStart {
    id: String,
    model: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicBlockStart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Parses one `data: ...` payload into zero-or-one canonical chunks.
/// `[DONE]` and malformed/unrecognized events yield `None`.
pub fn parse_anthropic_sse(data: &str) -> Option<StreamChunk> {
    if data.trim() == "[DONE]" {
        return None;
    }
    let event: AnthropicEvent = serde_json::from_str(data).ok()?;
    match event {
        AnthropicEvent::MessageStart { message } => Some(StreamChunk::MessageStart {
            message: MessageStartInfo {
                id: message.id,
                model: message.model,
                role: Role::Assistant,
            },
        }),
        AnthropicEvent::ContentBlockStart { index, content_block } => {
            let block = match content_block {
                AnthropicBlockStart::Text { text } => ContentBlockStart::Text { text },
                AnthropicBlockStart::ToolUse { id, name } => ContentBlockStart::ToolUse { id, name },
                AnthropicBlockStart::Thinking { thinking } => {
                    ContentBlockStart::Reasoning { reasoning: thinking }
                }
            };
            Some(StreamChunk::ContentBlockStart {
                index,
                content_block: block,
            })
        }
        AnthropicEvent::ContentBlockDelta { index, delta } => {
            let delta = match delta {
                AnthropicDelta::TextDelta { text } => ContentDelta::TextDelta { text },
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    ContentDelta::PartialJson { partial_json }
                }
                AnthropicDelta::ThinkingDelta { thinking } => {
                    ContentDelta::ReasoningDelta { reasoning: thinking }
                }
            };
            Some(StreamChunk::ContentBlockDelta { index, delta })
        }
        AnthropicEvent::ContentBlockStop { index } => Some(StreamChunk::ContentBlockStop { index }),
        AnthropicEvent::MessageDelta { usage } => Some(StreamChunk::MessageDelta {
            usage: usage
                .map(|u| Usage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                    cache_read_tokens: None,
                    cache_create_tokens: None,
                })
                .unwrap_or_default(),
        }),
        AnthropicEvent::MessageStop => Some(StreamChunk::MessageStop),
        AnthropicEvent::Unknown => None,
    }
}

// ---------------------------------------------------------------------------
// OpenAI-dialect SSE → canonical StreamChunk, with cross-chunk tool-call
// argument accumulation.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    started: bool,
    canonical_index: Option<usize>,
}

/// Stateful assembler: indexed tool-call deltas accumulate
/// `function.arguments` substrings per index, matching the provider-
/// supplied `index` field. One instance per streamed request.
pub struct OpenAiStreamAssembler {
    next_index: usize,
    text_block_open: bool,
    tool_calls: std::collections::BTreeMap<usize, PendingToolCall>,
    message_started: bool,
    model: String,
    id: String,
}

impl OpenAiStreamAssembler {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            text_block_open: false,
            tool_calls: std::collections::BTreeMap::new(),
            message_started: false,
            model: String::new(),
            id: String::new(),
        }
    }

    /// Feed one `data: ...` payload; returns the canonical chunks it
    /// produces (zero, one, or several — e.g. a finish event both closes
    /// the open text block and emits pending tool-use blocks).
    pub fn feed(&mut self, data: &str) -> Vec<StreamChunk> {
        if data.trim() == "[DONE]" {
            return self.finish(None);
        }
        let parsed: OpenAiChunk = match serde_json::from_str(data) {
            Ok(p) => p,
            Err(_) => return vec![],
        };

        let mut out = Vec::new();
        if !self.message_started {
            self.message_started = true;
            self.id = parsed.id.clone();
            self.model = parsed.model.clone();
            out.push(StreamChunk::MessageStart {
                message: MessageStartInfo {
                    id: parsed.id,
                    model: parsed.model,
                    role: Role::Assistant,
                },
            });
        }

        let Some(choice) = parsed.choices.into_iter().next() else {
            return out;
        };

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            if !self.text_block_open {
                self.text_block_open = true;
                out.push(StreamChunk::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlockStart::Text { text: String::new() },
                });
            }
            out.push(StreamChunk::ContentBlockDelta {
                index: 0,
                delta: ContentDelta::TextDelta { text },
            });
        }

        if let Some(tool_calls) = choice.delta.tool_calls {
            for tc in tool_calls {
                let slot_index = self.tool_calls.len() + 1; // index 0 reserved for text
                let entry = self
                    .tool_calls
                    .entry(tc.index)
                    .or_insert_with(|| PendingToolCall {
                        id: tc.id.clone().unwrap_or_default(),
                        name: String::new(),
                        arguments: String::new(),
                        started: false,
                        canonical_index: None,
                    });
                if let Some(id) = tc.id {
                    if !id.is_empty() {
                        entry.id = id;
                    }
                }
                if let Some(func) = tc.function {
                    if let Some(name) = func.name {
                        if !name.is_empty() {
                            entry.name = name;
                        }
                    }
                    if let Some(args) = func.arguments {
                        entry.arguments.push_str(&args);
                    }
                }
                if !entry.started && !entry.name.is_empty() {
                    entry.started = true;
                    let canonical_index = self.next_index.max(slot_index);
                    self.next_index = canonical_index + 1;
                    let id = if entry.id.is_empty() {
                        synth_tool_id()
                    } else {
                        entry.id.clone()
                    };
                    entry.id = id.clone();
                    entry.canonical_index = Some(canonical_index);
                    out.push(StreamChunk::ContentBlockStart {
                        index: canonical_index,
                        content_block: ContentBlockStart::ToolUse {
                            id,
                            name: entry.name.clone(),
                        },
                    });
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            out.extend(self.finish(Some(reason)));
        }

        out
    }

    fn finish(&mut self, finish_reason: Option<String>) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        if self.text_block_open {
            out.push(StreamChunk::ContentBlockStop { index: 0 });
            self.text_block_open = false;
        }
        // Stable order by canonical index, not insertion order.
        let mut entries: Vec<_> = std::mem::take(&mut self.tool_calls).into_iter().collect();
        entries.sort_by_key(|(k, _)| *k);
        for (_, call) in entries {
            let Some(index) = call.canonical_index else {
                continue;
            };
            // malformed or empty accumulated arguments degrade to `{}`,
            // matching the non-streaming parse path.
            let value = serde_json::from_str::<Value>(&call.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            out.push(StreamChunk::ContentBlockDelta {
                index,
                delta: ContentDelta::PartialJson {
                    partial_json: value.to_string(),
                },
            });
            out.push(StreamChunk::ContentBlockStop { index });
        }
        out.push(StreamChunk::MessageDelta {
            usage: Usage::default(),
        });
        let _ = finish_reason; // stop_reason is derived by the caller from the final response, not injected mid-stream
        out.push(StreamChunk::MessageStop);
        out
    }
}

impl Default for OpenAiStreamAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn synth_tool_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 6] = rng.gen();
    format!("call_{}", hex::encode(bytes))
}

/// Maps an OpenAI-family `finish_reason` to the canonical `StopReason`.
pub fn map_finish_reason(reason: &str) -> crate::message::StopReason {
    use crate::message::StopReason;
    match reason {
        "stop" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "tool_calls" => StopReason::ToolUse,
        "content_filter" => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_done_sentinel_yields_no_chunk() {
        assert!(parse_anthropic_sse("[DONE]").is_none());
    }

    #[test]
    fn anthropic_message_stop_maps_directly() {
        let chunk = parse_anthropic_sse(r#"{"type":"message_stop"}"#).unwrap();
        assert!(matches!(chunk, StreamChunk::MessageStop));
    }

    #[test]
    fn anthropic_text_delta_roundtrips() {
        let chunk = parse_anthropic_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        )
        .unwrap();
        match chunk {
            StreamChunk::ContentBlockDelta { index, delta } => {
                assert_eq!(index, 0);
                assert!(matches!(delta, ContentDelta::TextDelta { text } if text == "hi"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn tool_call_block_is_opened_and_closed_with_accumulated_arguments() {
        let mut assembler = OpenAiStreamAssembler::new();
        let mut all = Vec::new();
        all.extend(assembler.feed(
            r#"{"id":"x","model":"gpt","choices":[{"delta":{"content":"Let me check"}}]}"#,
        ));
        all.extend(assembler.feed(
            r#"{"id":"x","model":"gpt","choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_x","function":{"name":"get_time","arguments":"{\"city\""}}]}}]}"#,
        ));
        all.extend(assembler.feed(
            r#"{"id":"x","model":"gpt","choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":\"nyc\"}"}}]}}]}"#,
        ));
        all.extend(assembler.feed(
            r#"{"id":"x","model":"gpt","choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
        ));

        assert!(matches!(all[0], StreamChunk::MessageStart { .. }));
        assert!(matches!(
            all[1],
            StreamChunk::ContentBlockStart {
                index: 0,
                content_block: ContentBlockStart::Text { .. }
            }
        ));
        assert!(matches!(all[2], StreamChunk::ContentBlockDelta { index: 0, .. }));
        // tool call starts at canonical index 1
        assert!(all.iter().any(|c| matches!(
            c,
            StreamChunk::ContentBlockStart {
                index: 1,
                content_block: ContentBlockStart::ToolUse { name, .. }
            } if name == "get_time"
        )));
        let arguments_delta = all.iter().find_map(|c| match c {
            StreamChunk::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::PartialJson { partial_json },
            } => Some(partial_json.clone()),
            _ => None,
        });
        let arguments_delta = arguments_delta.expect("missing content_block_delta for tool call index 1");
        let parsed: Value = serde_json::from_str(&arguments_delta).unwrap();
        assert_eq!(parsed, serde_json::json!({"city": "nyc"}));
        assert!(all.iter().any(|c| matches!(c, StreamChunk::ContentBlockStop { index: 1 })));
        assert!(matches!(all.last().unwrap(), StreamChunk::MessageStop));
    }

    #[test]
    fn exactly_one_message_stop_is_emitted_per_stream() {
        let mut assembler = OpenAiStreamAssembler::new();
        let mut all = Vec::new();
        all.extend(assembler.feed(r#"{"id":"x","model":"m","choices":[{"delta":{"content":"hi"}}]}"#));
        all.extend(assembler.feed(r#"{"id":"x","model":"m","choices":[{"delta":{},"finish_reason":"stop"}]}"#));
        let stops = all
            .iter()
            .filter(|c| matches!(c, StreamChunk::MessageStop))
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn finish_reason_strings_map_to_stop_reason_variants() {
        use crate::message::StopReason;
        assert_eq!(map_finish_reason("stop"), StopReason::EndTurn);
        assert_eq!(map_finish_reason("tool_calls"), StopReason::ToolUse);
        assert_eq!(map_finish_reason("length"), StopReason::MaxTokens);
    }

    #[test]
    fn sse_line_buffer_reassembles_split_lines() {
        let mut buf = SseLineBuffer::default();
        let mut lines = buf.push(b"data: {\"a\":");
        assert!(lines.is_empty());
        lines = buf.push(b"1}\n");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
    }
}
