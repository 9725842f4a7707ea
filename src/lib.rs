pub mod bootstrap;
pub mod clients;
pub mod credentials;
pub mod error;
pub mod message;
pub mod models;
pub mod oauth;
pub mod provider;
pub mod retry;
pub mod sigv4;
pub mod stream;
pub mod transform;

pub use bootstrap::{create_provider_resolved, create_registry_from_env};
pub use credentials::{
    get_api_key_with_fallback, CredentialError, CredentialStore, Credentials, OAuthToken,
    DEVICE_OAUTH_SENTINEL, OAUTH_SENTINEL,
};
pub use error::{classify, ClassifiedError, ClassifiedErrorKind, ProviderError};
pub use message::*;
pub use models::{ModelInfo, ModelsRegistry};
pub use provider::{Provider, ProviderFactory, ProviderRegistry};
pub use retry::{with_retry, with_retry_and_hook, with_retry_cancellable, IsRetryable, RetryConfig};
pub use stream::{
    map_finish_reason, parse_anthropic_sse, OpenAiStreamAssembler, SseLineBuffer,
};
