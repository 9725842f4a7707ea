//! Google Vertex client (C9), a thin `OpenAiCompatibleClient` instantiation
//! against Vertex's OpenAI-compatible `endpoints/openapi` surface, URL
//! templated by project id and location the way the teacher's `vertex.rs`
//! templates its native-API base URL. Auth is a short-lived OAuth2 access
//! token (from `gcloud auth print-access-token` or a service-account
//! exchange), not a long-lived API key.

use crate::clients::openai_compatible::OpenAiCompatibleClient;

pub fn new(access_token: impl Into<String>, project_id: &str, location: &str) -> OpenAiCompatibleClient {
    let base_url = format!(
        "https://{location}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{location}/endpoints/openapi"
    );
    OpenAiCompatibleClient::new(
        "google-vertex",
        base_url,
        access_token,
        vec![
            "gemini-2.0-flash".to_string(),
            "gemini-2.0-flash-lite".to_string(),
            "gemini-1.5-pro".to_string(),
            "gemini-1.5-flash".to_string(),
        ],
    )
}
