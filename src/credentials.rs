//! Credential store & resolver (C4), grounded in the teacher's
//! `auth.rs::AuthManager` (atomic persistence, 0600/0700 permissions) but
//! restructured to the single-file-per-product shape this crate requires:
//! one `credentials.json` holding per-provider API keys plus an
//! `oauth_tokens` map, and a separate `copilot_oauth.json` for Copilot's
//! historical device-flow path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no API key found for provider '{0}'")]
    NoKeyFound(String),
}

/// `{access, refresh, expires_at (epoch seconds), account_id}`.
///
/// `is_expired ⇔ expires_at > 0 ∧ now > expires_at` — a zero `expires_at`
/// means "no expiry known" and never expires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthToken {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl OAuthToken {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at > 0 && now > self.expires_at
    }
}

/// `{access_token, created_at (unix s)}` — the Copilot device-flow file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CopilotOAuth {
    pub access_token: String,
    pub created_at: i64,
}

/// Persisted object: per-provider API-key slot, `oauth_tokens` map, and a
/// `custom_providers` map for user-defined backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub api_keys: HashMap<String, String>,
    pub oauth_tokens: HashMap<String, OAuthToken>,
    pub custom_providers: HashMap<String, String>,
}

impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(
            self.api_keys.len() + 2,
        ))?;
        for (provider, key) in &self.api_keys {
            map.serialize_entry(&format!("{provider}_api_key"), key)?;
        }
        map.serialize_entry("oauth_tokens", &self.oauth_tokens)?;
        map.serialize_entry("custom_providers", &self.custom_providers)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: HashMap<String, serde_json::Value> = Deserialize::deserialize(deserializer)?;
        let mut creds = Credentials::default();
        for (key, value) in raw {
            match key.as_str() {
                "oauth_tokens" => {
                    creds.oauth_tokens = serde_json::from_value(value)
                        .map_err(serde::de::Error::custom)?;
                }
                "custom_providers" => {
                    creds.custom_providers = serde_json::from_value(value)
                        .map_err(serde::de::Error::custom)?;
                }
                _ => {
                    if let Some(provider) = key.strip_suffix("_api_key") {
                        if let Some(s) = value.as_str() {
                            creds.api_keys.insert(provider.to_string(), s.to_string());
                        }
                    }
                }
            }
        }
        Ok(creds)
    }
}

/// Per-provider environment-variable fallback list, checked in
/// order before falling through to the stored key.
fn env_vars_for(provider: &str) -> &'static [&'static str] {
    match provider {
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "google" => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
        "groq" => &["GROQ_API_KEY"],
        "openrouter" => &["OPENROUTER_API_KEY"],
        "xai" => &["XAI_API_KEY"],
        "deepseek" => &["DEEPSEEK_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "deepinfra" => &["DEEPINFRA_API_KEY"],
        "cerebras" => &["CEREBRAS_API_KEY"],
        "together" => &["TOGETHER_API_KEY", "TOGETHERAI_API_KEY"],
        "cohere" => &["COHERE_API_KEY", "CO_API_KEY"],
        "perplexity" => &["PERPLEXITY_API_KEY"],
        "replicate" => &["REPLICATE_API_TOKEN"],
        "azure" => &["AZURE_OPENAI_API_KEY", "AZURE_API_KEY"],
        "copilot" => &["GITHUB_TOKEN"],
        "gitlab" => &["GITLAB_TOKEN", "GITLAB_API_TOKEN"],
        "cloudflare" => &["CLOUDFLARE_API_TOKEN"],
        _ => &[],
    }
}

pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// `dir` is `<config>/dcode` — created 0700 on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn credentials_path(&self) -> PathBuf {
        self.dir.join("credentials.json")
    }

    fn copilot_path(&self) -> PathBuf {
        self.dir.join("copilot_oauth.json")
    }

    pub fn load(&self) -> Result<Credentials, CredentialError> {
        let path = self.credentials_path();
        if !path.exists() {
            return Ok(Credentials::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Atomic write-temp-then-rename, 0600 file inside a 0700 directory.
    pub fn save(&self, creds: &Credentials) -> Result<(), CredentialError> {
        ensure_dir_0700(&self.dir)?;
        let data = serde_json::to_string_pretty(creds)?;
        atomic_write_0600(&self.credentials_path(), data.as_bytes())?;
        Ok(())
    }

    pub fn load_copilot_oauth(&self) -> Result<Option<CopilotOAuth>, CredentialError> {
        let path = self.copilot_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    pub fn save_copilot_oauth(&self, token: &CopilotOAuth) -> Result<(), CredentialError> {
        ensure_dir_0700(&self.dir)?;
        let data = serde_json::to_string_pretty(token)?;
        atomic_write_0600(&self.copilot_path(), data.as_bytes())?;
        Ok(())
    }
}

#[cfg(unix)]
fn ensure_dir_0700(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn ensure_dir_0700(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn atomic_write_0600(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    std::fs::rename(&tmp, path)
}

#[cfg(not(unix))]
fn atomic_write_0600(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

/// Sentinel returned in place of a real key when the caller should
/// substitute the OAuth-derived token at provider-construction time.
pub const OAUTH_SENTINEL: &str = "oauth";
pub const DEVICE_OAUTH_SENTINEL: &str = "device_oauth";

/// `get_api_key_with_fallback(provider, config) → key | error`.
/// `config_value` stands in for the external config collaborator's
/// resolved value (out of scope here; passed in by the caller).
pub fn get_api_key_with_fallback(
    provider: &str,
    store: &CredentialStore,
    config_value: Option<&str>,
) -> Result<String, CredentialError> {
    for var in env_vars_for(provider) {
        if let Ok(val) = std::env::var(var) {
            if !val.is_empty() {
                return Ok(val);
            }
        }
    }

    let creds = store.load()?;
    if let Some(key) = creds.api_keys.get(provider) {
        if !key.is_empty() {
            return Ok(key.clone());
        }
    }

    if provider == "anthropic" {
        if let Some(token) = creds.oauth_tokens.get("anthropic") {
            if !token.access.is_empty() {
                return Ok(OAUTH_SENTINEL.to_string());
            }
        }
    }

    if let Some(val) = config_value {
        if !val.is_empty() {
            return Ok(val.to_string());
        }
    }

    if provider == "copilot" {
        if let Ok(Some(token)) = store.load_copilot_oauth() {
            if !token.access_token.is_empty() {
                return Ok(DEVICE_OAUTH_SENTINEL.to_string());
            }
        }
    }

    Err(CredentialError::NoKeyFound(provider.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempDir(PathBuf);
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn temp_store() -> (TempDir, CredentialStore) {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let base = std::env::temp_dir().join(format!(
            "dcode-credentials-test-{}-{}",
            std::process::id(),
            n
        ));
        let store = CredentialStore::new(base.join("dcode"));
        (TempDir(base), store)
    }

    #[test]
    fn save_then_load_roundtrips_pointwise() {
        let (_dir, store) = temp_store();
        let mut creds = Credentials::default();
        creds
            .api_keys
            .insert("anthropic".to_string(), "sk-ant-xxx".to_string());
        creds.oauth_tokens.insert(
            "anthropic".to_string(),
            OAuthToken {
                access: "tok".into(),
                refresh: Some("ref".into()),
                expires_at: 1234567890,
                account_id: Some("acct".into()),
            },
        );
        store.save(&creds).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, creds);
    }

    #[cfg(unix)]
    #[test]
    fn saved_credentials_file_is_0600_inside_0700_dir() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = temp_store();
        store.save(&Credentials::default()).unwrap();
        let file_mode = std::fs::metadata(store.credentials_path())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        let dir_mode = std::fs::metadata(&store.dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn oauth_token_zero_expiry_never_expires() {
        let token = OAuthToken {
            access: "a".into(),
            refresh: None,
            expires_at: 0,
            account_id: None,
        };
        assert!(!token.is_expired(i64::MAX));
    }

    #[test]
    fn oauth_token_expired_when_now_past_expiry() {
        let token = OAuthToken {
            access: "a".into(),
            refresh: None,
            expires_at: 100,
            account_id: None,
        };
        assert!(token.is_expired(101));
        assert!(!token.is_expired(100));
    }
}
