//! OpenRouter client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `openrouter.rs` model lineup, which re-exposes
//! other vendors' models under `vendor/model` ids.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://openrouter.ai/api/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "openrouter",
        BASE_URL,
        api_key,
        vec![
            "anthropic/claude-sonnet-4".to_string(),
            "anthropic/claude-3.5-sonnet".to_string(),
            "openai/gpt-4o".to_string(),
            "openai/gpt-4o-mini".to_string(),
            "google/gemini-2.5-pro-preview".to_string(),
            "google/gemini-2.0-flash-001".to_string(),
            "deepseek/deepseek-chat".to_string(),
            "meta-llama/llama-3.3-70b-instruct".to_string(),
        ],
    )
}
