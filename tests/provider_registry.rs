use dcode_provider::{
    create_provider_resolved, create_registry_from_env, CredentialStore, DEVICE_OAUTH_SENTINEL,
    OAUTH_SENTINEL,
};

fn temp_credential_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("dcode-integration-{label}-{}", std::process::id()))
}

#[test]
fn registry_dispatches_every_openai_compatible_vendor_by_id() {
    let dir = temp_credential_dir("vendors");
    let registry = create_registry_from_env(&dir);

    for id in [
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
    ] {
        let provider = registry
            .create_provider(id, "sk-test")
            .unwrap_or_else(|e| panic!("expected {id} to construct: {e:?}"));
        assert_eq!(provider.name(), id);
    }
}

#[test]
fn registry_rejects_anthropic_without_stored_oauth_token() {
    let dir = temp_credential_dir("anthropic-no-token");
    let registry = create_registry_from_env(&dir);
    let err = registry.create_provider("anthropic", "sk-ignored");
    assert!(err.is_err(), "anthropic must require an OAuth token, not an api key");
}

#[test]
fn registry_rejects_copilot_without_device_flow_token() {
    let dir = temp_credential_dir("copilot-no-token");
    let registry = create_registry_from_env(&dir);
    let err = registry.create_provider("copilot", "");
    assert!(err.is_err(), "copilot must require a device-flow token");
}

#[test]
fn registry_resolves_custom_vendor_to_openai_compatible_fallback() {
    let dir = temp_credential_dir("custom-fallback");
    let registry = create_registry_from_env(&dir);
    let provider = registry.create_provider("some-internal-llm-gateway", "sk-custom").unwrap();
    assert_eq!(provider.name(), "custom");
}

#[test]
fn azure_requires_endpoint_env_var_to_construct() {
    std::env::remove_var("AZURE_OPENAI_ENDPOINT");
    let dir = temp_credential_dir("azure-missing-endpoint");
    let registry = create_registry_from_env(&dir);
    let err = registry.create_provider("azure", "sk-azure");
    assert!(err.is_err());
}

#[test]
fn create_provider_resolved_reads_stored_api_key() {
    let dir = temp_credential_dir("resolved-key");
    let store = CredentialStore::new(dir.clone());
    let mut creds = store.load().unwrap();
    creds.api_keys.insert("groq".to_string(), "gsk-stored".to_string());
    store.save(&creds).unwrap();

    let registry = create_registry_from_env(&dir);
    let provider = create_provider_resolved(&registry, &store, "groq").unwrap();
    assert_eq!(provider.name(), "groq");
}

#[test]
fn oauth_sentinels_are_distinct_markers() {
    assert_ne!(OAUTH_SENTINEL, DEVICE_OAUTH_SENTINEL);
}
