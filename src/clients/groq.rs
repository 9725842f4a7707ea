//! Groq client (C9), a thin `OpenAiCompatibleClient` instantiation grounded
//! in the teacher's `groq.rs`.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.groq.com/openai/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "groq",
        BASE_URL,
        api_key,
        vec![
            "llama-3.3-70b-versatile".to_string(),
            "llama-3.1-8b-instant".to_string(),
            "mixtral-8x7b-32768".to_string(),
            "gemma2-9b-it".to_string(),
            "deepseek-r1-distill-llama-70b".to_string(),
        ],
    )
}
