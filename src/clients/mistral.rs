//! Mistral client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `mistral.rs` model lineup. Mistral's tool-id
//! normalization quirk (strip to alphanumeric, pad to 9 chars) is applied
//! by the shared schema transformer, not here.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.mistral.ai/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "mistral",
        BASE_URL,
        api_key,
        vec![
            "mistral-large-latest".to_string(),
            "mistral-medium-latest".to_string(),
            "mistral-small-latest".to_string(),
            "codestral-latest".to_string(),
            "pixtral-12b-2409".to_string(),
        ],
    )
}
