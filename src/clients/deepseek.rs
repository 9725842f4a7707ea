//! DeepSeek client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `deepseek.rs` model lineup.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.deepseek.com";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "deepseek",
        BASE_URL,
        api_key,
        vec!["deepseek-chat".to_string(), "deepseek-reasoner".to_string()],
    )
}
