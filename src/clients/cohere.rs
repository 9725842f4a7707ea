//! Cohere client (C9), a thin `OpenAiCompatibleClient` instantiation
//! against Cohere's OpenAI-compatibility surface. The model lineup is
//! grounded in the teacher's `cohere.rs`; unlike the teacher, which talks
//! to Cohere's native `/v2/chat` endpoint directly, this client goes
//! through the shared OpenAI-compat base per the unified dispatch the
//! provider registry expects.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.cohere.ai/compatibility/v1";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "cohere",
        BASE_URL,
        api_key,
        vec![
            "command-r-plus-08-2024".to_string(),
            "command-r-08-2024".to_string(),
            "command".to_string(),
            "command-light".to_string(),
        ],
    )
}
