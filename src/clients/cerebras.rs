//! Cerebras client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's (opencode-provider) `cerebras.rs` model
//! lineup.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.cerebras.ai/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "cerebras",
        BASE_URL,
        api_key,
        vec!["llama-3.3-70b".to_string(), "llama-3.1-8b".to_string()],
    )
}
