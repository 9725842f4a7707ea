//! Registry wiring (C7), narrowed from the teacher's `bootstrap.rs`
//! (which assembles a registry from npm AI-SDK package config) down to its
//! essential shape: one function that registers every supported backend's
//! factory closure, keyed by provider id, against a fresh
//! [`ProviderRegistry`]. Credential resolution per factory goes through
//! [`crate::credentials::get_api_key_with_fallback`] so the environment
//! variable and stored-key precedence applies uniformly.

use std::sync::Arc;

use crate::clients::{
    azure, bedrock::BedrockClient, cerebras, cloudflare, cohere, copilot::CopilotClient,
    deepinfra, deepseek, gitlab, google::GoogleClient, groq, mistral, openai, openai_compatible,
    openrouter, perplexity, replicate, together, vertex, xai,
};
use crate::credentials::{get_api_key_with_fallback, CredentialStore};
use crate::error::ProviderError;
use crate::provider::{Provider, ProviderFactory, ProviderRegistry};

fn openai_compat_factory<F>(build: F) -> ProviderFactory
where
    F: Fn(String) -> openai_compatible::OpenAiCompatibleClient + Send + Sync + 'static,
{
    Arc::new(move |key: &str| Ok(Arc::new(build(key.to_string())) as Arc<dyn Provider>))
}

/// Builds a registry wired to every backend this crate knows how to talk
/// to, with credentials resolved from the environment and `credential_dir`
/// at provider-construction time.
pub fn create_registry_from_env(credential_dir: impl Into<std::path::PathBuf>) -> ProviderRegistry {
    let store = CredentialStore::new(credential_dir.into());
    let mut registry = ProviderRegistry::new(store);

    registry.register(
        "anthropic",
        Arc::new(|token: &str| {
            Ok(Arc::new(crate::clients::anthropic::AnthropicClient::new(token.to_string()))
                as Arc<dyn Provider>)
        }),
    );

    registry.register(
        "copilot",
        Arc::new(|token: &str| {
            Ok(Arc::new(CopilotClient::new(token.to_string())) as Arc<dyn Provider>)
        }),
    );

    registry.register(
        "bedrock",
        Arc::new(|_key: &str| Ok(Arc::new(BedrockClient::from_env()?) as Arc<dyn Provider>)),
    );

    registry.register(
        "google",
        Arc::new(|key: &str| {
            Ok(Arc::new(GoogleClient::new(key.to_string())) as Arc<dyn Provider>)
        }),
    );

    registry.register("openai", openai_compat_factory(openai::new));
    registry.register("groq", openai_compat_factory(groq::new));
    registry.register("openrouter", openai_compat_factory(openrouter::new));
    registry.register("xai", openai_compat_factory(xai::new));
    registry.register("deepseek", openai_compat_factory(deepseek::new));
    registry.register("mistral", openai_compat_factory(mistral::new));
    registry.register("deepinfra", openai_compat_factory(deepinfra::new));
    registry.register("cerebras", openai_compat_factory(cerebras::new));
    registry.register("together", openai_compat_factory(together::new));
    registry.register("cohere", openai_compat_factory(cohere::new));
    registry.register("perplexity", openai_compat_factory(perplexity::new));
    registry.register("replicate", openai_compat_factory(replicate::new));
    registry.register("gitlab", openai_compat_factory(gitlab::new));

    registry.register(
        "azure",
        Arc::new(|key: &str| {
            let endpoint = std::env::var("AZURE_OPENAI_ENDPOINT").map_err(|_| {
                ProviderError::Config("AZURE_OPENAI_ENDPOINT not set for azure".to_string())
            })?;
            Ok(Arc::new(azure::AzureClient::new(key.to_string(), endpoint)) as Arc<dyn Provider>)
        }),
    );

    registry.register(
        "cloudflare",
        Arc::new(|key: &str| {
            let account_id = std::env::var("CLOUDFLARE_ACCOUNT_ID").map_err(|_| {
                ProviderError::Config("CLOUDFLARE_ACCOUNT_ID not set for cloudflare".to_string())
            })?;
            Ok(Arc::new(cloudflare::new(key.to_string(), &account_id)) as Arc<dyn Provider>)
        }),
    );

    registry.register(
        "google-vertex",
        Arc::new(|key: &str| {
            let project_id = std::env::var("GOOGLE_VERTEX_PROJECT").map_err(|_| {
                ProviderError::Config("GOOGLE_VERTEX_PROJECT not set for google-vertex".to_string())
            })?;
            let location = std::env::var("GOOGLE_VERTEX_LOCATION")
                .unwrap_or_else(|_| "us-central1".to_string());
            Ok(Arc::new(vertex::new(key.to_string(), &project_id, &location)) as Arc<dyn Provider>)
        }),
    );

    // Unrecognized provider ids fall through to a generic OpenAI-compatible
    // client labeled with their own name, for user-configured custom backends.
    registry.register(
        "__openai_compatible__",
        Arc::new(|key: &str| {
            Ok(Arc::new(openai_compatible::OpenAiCompatibleClient::new(
                "custom",
                key.to_string(),
                key.to_string(),
                vec![],
            )) as Arc<dyn Provider>)
        }),
    );

    registry
}

/// Resolves the API key for `provider_id` and constructs it
/// through the registry. This is the one-call path most callers use;
/// `ProviderRegistry::create_provider` alone is for callers that already
/// resolved a key (e.g. from a custom provider's config entry).
pub fn create_provider_resolved(
    registry: &ProviderRegistry,
    store: &CredentialStore,
    provider_id: &str,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let key = get_api_key_with_fallback(provider_id, store, None)
        .map_err(|e| ProviderError::Config(e.to_string()))?;
    registry.create_provider(provider_id, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_openai_compatible_vendor() {
        let dir = std::env::temp_dir().join(format!("dcode-bootstrap-test-{}", std::process::id()));
        let registry = create_registry_from_env(dir);
        for id in [
            "anthropic",
            "copilot",
            "bedrock",
            "google",
            "openai",
            "groq",
            "openrouter",
            "xai",
            "deepseek",
            "mistral",
            "deepinfra",
            "cerebras",
            "together",
            "cohere",
            "perplexity",
            "replicate",
            "gitlab",
            "azure",
            "cloudflare",
            "google-vertex",
        ] {
            assert!(registry.is_registered(id), "missing registration for {id}");
        }
    }

    #[test]
    fn unregistered_vendor_falls_back_to_custom_openai_compatible() {
        let dir = std::env::temp_dir().join(format!("dcode-bootstrap-test2-{}", std::process::id()));
        let registry = create_registry_from_env(dir);
        let provider = registry.create_provider("my-custom-llm", "sk-xyz").unwrap();
        assert_eq!(provider.name(), "custom");
    }
}
