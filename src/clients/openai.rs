//! OpenAI client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `openai.rs` model lineup.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.openai.com/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "openai",
        BASE_URL,
        api_key,
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
            "o1-preview".to_string(),
            "o1-mini".to_string(),
        ],
    )
}
