//! Perplexity client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `perplexity.rs` model lineup.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.perplexity.ai";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "perplexity",
        BASE_URL,
        api_key,
        vec![
            "sonar-pro".to_string(),
            "sonar".to_string(),
            "sonar-reasoning-pro".to_string(),
            "sonar-reasoning".to_string(),
        ],
    )
}
