//! Cloudflare Workers AI client (C9), a thin `OpenAiCompatibleClient`
//! instantiation whose base URL is templated by account id
//! (`CLOUDFLARE_ACCOUNT_ID`). No teacher file covers Cloudflare
//! directly; grounded in the generic C9 template.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

pub fn new(api_key: impl Into<String>, account_id: &str) -> OpenAiCompatibleClient {
    let base_url = format!("https://api.cloudflare.com/client/v4/accounts/{account_id}/ai/v1");
    OpenAiCompatibleClient::new(
        "cloudflare",
        base_url,
        api_key,
        vec![
            "@cf/meta/llama-3.3-70b-instruct-fp8-fast".to_string(),
            "@cf/mistral/mistral-7b-instruct-v0.2".to_string(),
        ],
    )
}
