//! DeepInfra client (C9), a thin `OpenAiCompatibleClient` instantiation.
//! No teacher file covers DeepInfra directly; grounded in the generic C9
//! template, hosting open-weight models under DeepInfra's own ids.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const BASE_URL: &str = "https://api.deepinfra.com/v1/openai";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        "deepinfra",
        BASE_URL,
        api_key,
        vec![
            "meta-llama/Llama-3.3-70B-Instruct".to_string(),
            "Qwen/Qwen2.5-72B-Instruct".to_string(),
            "mistralai/Mixtral-8x7B-Instruct-v0.1".to_string(),
        ],
    )
}
