//! GitLab Duo client (C9), a thin `OpenAiCompatibleClient` instantiation
//! grounded in the teacher's `gitlab.rs` model lineup, pointed at a
//! configurable instance URL (self-managed GitLab installs proxy Duo
//! chat through their own domain) defaulting to gitlab.com.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

const DEFAULT_INSTANCE_URL: &str = "https://gitlab.com";

pub fn new(api_key: impl Into<String>) -> OpenAiCompatibleClient {
    with_instance_url(api_key, DEFAULT_INSTANCE_URL)
}

pub fn with_instance_url(api_key: impl Into<String>, instance_url: &str) -> OpenAiCompatibleClient {
    let base_url = format!("{}/api/v4/ai", instance_url.trim_end_matches('/'));
    OpenAiCompatibleClient::new(
        "gitlab",
        base_url,
        api_key,
        vec![
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
            "code-suggestions".to_string(),
        ],
    )
}
