//! Provider interface & dispatch registry (C7), grounded in the teacher's
//! `provider.rs::ProviderRegistry` but restructured to a four-operation
//! contract and special-cased `create_provider` dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::{CredentialStore, OAUTH_SENTINEL};
use crate::error::ProviderError;
use crate::message::{MessageRequest, MessageResponse, RequestOptions, StreamChunk};

/// Every provider exposes these four operations.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in credential lookup.
    fn name(&self) -> &str;

    /// May be lazily fetched from the backend (Copilot) with a fallback
    /// list on failure; cached indefinitely in-process by the implementor.
    async fn models(&self) -> Vec<String>;

    /// `options` carries caller-supplied reasoning effort and provider-
    /// specific overrides; each backend's wire builder applies them
    /// (reasoning-variant injection, thinking-budget max-tokens arithmetic,
    /// model-family temperature/top_p defaults) before serialization.
    async fn create_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
    ) -> Result<MessageResponse, ProviderError>;

    /// The callback is invoked in wire order, synchronously on the calling
    /// task; implementations must not spawn per-chunk parallelism. Returning an
    /// error from the callback aborts the stream.
    async fn stream_message(
        &self,
        request: MessageRequest,
        options: &RequestOptions,
        callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError>;
}

/// Factory signature a vendor module registers under its provider id.
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    credential_store: CredentialStore,
}

impl ProviderRegistry {
    pub fn new(credential_store: CredentialStore) -> Self {
        Self {
            factories: HashMap::new(),
            credential_store,
        }
    }

    pub fn register(&mut self, id: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(id.into(), factory);
    }

    /// `create_provider(name, api_key) → provider | error`.
    ///
    /// Special cases: `anthropic` ignores the passed key and loads its
    /// OAuth token from credentials; `copilot` takes no key and loads from
    /// `copilot_oauth.json`; `bedrock` uses AWS-env-var credentials, not
    /// the key. Unknown names fall through to the OpenAI-compatible client
    /// with that name as a label.
    pub fn create_provider(
        &self,
        name: &str,
        api_key: &str,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        match name {
            "anthropic" => {
                let creds = self
                    .credential_store
                    .load()
                    .map_err(|e| ProviderError::Config(e.to_string()))?;
                let token = creds
                    .oauth_tokens
                    .get("anthropic")
                    .filter(|t| !t.access.is_empty())
                    .ok_or_else(|| {
                        ProviderError::Config(
                            "anthropic requires an OAuth token; run login".to_string(),
                        )
                    })?;
                let factory = self.factories.get("anthropic").ok_or_else(|| {
                    ProviderError::ProviderNotFound("anthropic".to_string())
                })?;
                factory(&token.access)
            }
            "copilot" => {
                let token = self
                    .credential_store
                    .load_copilot_oauth()
                    .map_err(|e| ProviderError::Config(e.to_string()))?
                    .filter(|t| !t.access_token.is_empty())
                    .ok_or_else(|| {
                        ProviderError::Config(
                            "copilot requires a device-flow token; run login".to_string(),
                        )
                    })?;
                let factory = self
                    .factories
                    .get("copilot")
                    .ok_or_else(|| ProviderError::ProviderNotFound("copilot".to_string()))?;
                factory(&token.access_token)
            }
            "bedrock" => {
                let factory = self
                    .factories
                    .get("bedrock")
                    .ok_or_else(|| ProviderError::ProviderNotFound("bedrock".to_string()))?;
                // Bedrock authenticates via AWS env vars inside the client
                // itself; the "key" argument is unused but kept for a
                // uniform factory signature.
                factory("")
            }
            known if self.factories.contains_key(known) => {
                let factory = self.factories.get(known).unwrap();
                factory(api_key)
            }
            unknown => {
                let factory = self.factories.get("__openai_compatible__").ok_or_else(|| {
                    ProviderError::ProviderNotFound(unknown.to_string())
                })?;
                factory(api_key)
            }
        }
        .map(|p| p as Arc<dyn Provider>)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.factories
            .keys()
            .filter(|k| k.as_str() != "__openai_compatible__")
            .cloned()
            .collect()
    }

    pub fn uses_oauth_sentinel(key: &str) -> bool {
        key == OAUTH_SENTINEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Role};

    struct StubProvider {
        id: String,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            &self.id
        }
        async fn models(&self) -> Vec<String> {
            vec!["stub-model".to_string()]
        }
        async fn create_message(
            &self,
            _request: MessageRequest,
            _options: &RequestOptions,
        ) -> Result<MessageResponse, ProviderError> {
            Ok(MessageResponse {
                id: "1".into(),
                model: "stub-model".into(),
                role: Role::Assistant,
                content: vec![],
                stop_reason: crate::message::StopReason::EndTurn,
                usage: Default::default(),
            })
        }
        async fn stream_message(
            &self,
            _request: MessageRequest,
            _options: &RequestOptions,
            callback: &mut (dyn FnMut(StreamChunk) -> Result<(), ProviderError> + Send),
        ) -> Result<(), ProviderError> {
            callback(StreamChunk::MessageStop)
        }
    }

    fn temp_registry() -> ProviderRegistry {
        let dir = std::env::temp_dir().join(format!("dcode-registry-test-{}", std::process::id()));
        ProviderRegistry::new(CredentialStore::new(dir))
    }

    #[test]
    fn unknown_provider_falls_back_to_openai_compatible_label() {
        let mut registry = temp_registry();
        registry.register(
            "__openai_compatible__",
            Arc::new(|key: &str| {
                Ok(Arc::new(StubProvider {
                    id: format!("custom:{key}"),
                }) as Arc<dyn Provider>)
            }),
        );
        let provider = registry.create_provider("some-custom-vendor", "sk-123").unwrap();
        assert_eq!(provider.name(), "custom:sk-123");
    }

    #[test]
    fn anthropic_requires_oauth_token_not_api_key() {
        let registry = temp_registry();
        let err = match registry.create_provider("anthropic", "sk-ignored") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[tokio::test]
    async fn registered_provider_dispatches_by_name() {
        let mut registry = temp_registry();
        registry.register(
            "groq",
            Arc::new(|key: &str| {
                Ok(Arc::new(StubProvider {
                    id: format!("groq:{key}"),
                }) as Arc<dyn Provider>)
            }),
        );
        let provider = registry.create_provider("groq", "gsk-1").unwrap();
        assert_eq!(provider.name(), "groq:gsk-1");
        let resp = provider
            .create_message(
                MessageRequest::new("llama", vec![Message::user("hi")], 16),
                &RequestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(resp.role, Role::Assistant);
    }
}
