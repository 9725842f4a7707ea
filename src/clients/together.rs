//! Together AI client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `together.rs` model lineup.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.together.xyz/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "together",
        BASE_URL,
        api_key,
        vec![
            "meta-llama/Llama-3.3-70B-Instruct-Turbo".to_string(),
            "meta-llama/Llama-3.2-90B-Vision-Instruct-Turbo".to_string(),
            "mistralai/Mixtral-8x7B-Instruct-v0.1".to_string(),
            "Qwen/Qwen2.5-72B-Instruct-Turbo".to_string(),
        ],
    )
}
