//! Replicate client (C9), a thin `OpenAiCompatibleClient` instantiation
//! against Replicate's OpenAI-compatible chat surface. No teacher file
//! covers Replicate directly; grounded in the generic C9 template.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.replicate.com/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "replicate",
        BASE_URL,
        api_key,
        vec![
            "meta/meta-llama-3.1-405b-instruct".to_string(),
            "mistralai/mixtral-8x7b-instruct-v0.1".to_string(),
        ],
    )
}
