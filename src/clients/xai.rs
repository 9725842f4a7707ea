//! xAI (Grok) client (C9), a thin `OpenAiCompatibleClient` instantiation.
//! No teacher file covers xAI directly; the model lineup and base URL are
//! grounded in the generic C9 template (same shape as `groq.rs`/`openai.rs`).

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.x.ai/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "xai",
        BASE_URL,
        api_key,
        vec![
            "grok-4".to_string(),
            "grok-4-fast".to_string(),
            "grok-3".to_string(),
            "grok-3-mini".to_string(),
        ],
    )
}
