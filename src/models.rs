//! Model registry & capability catalog, grounded in the teacher's
//! `models.rs::ModelsRegistry` (cache-then-fetch `RwLock<Option<...>>`
//! pattern) but restructured to a flat per-model shape with a refresh
//! ordering of on-disk cache before network, hourly in-process debounce,
//! and a 24h cache staleness threshold.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub const MODELS_DEV_URL: &str = "https://models.dev/api.json";
const REFRESH_DEBOUNCE: Duration = Duration::from_secs(3600);
const CACHE_STALE_AFTER: Duration = Duration::from_secs(24 * 3600);

/// On-disk shape of `models_cache.json`: the fetch timestamp alongside
/// the verbatim upstream JSON, so staleness can be judged from the
/// content itself rather than the file's mtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    fetched_at: chrono::DateTime<chrono::Utc>,
    data: RawCatalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Active,
    Beta,
    Alpha,
    Deprecated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub temperature: bool,
    pub reasoning: bool,
    pub attachment: bool,
    pub tool_call: bool,
    pub input_modalities: Vec<String>,
    pub output_modalities: Vec<String>,
    pub interleaved: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCost {
    pub input: f64,
    pub output: f64,
    #[serde(default)]
    pub cache_read: Option<f64>,
    #[serde(default)]
    pub cache_write: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLimits {
    pub context: u64,
    pub output: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider_id: String,
    pub name: String,
    #[serde(default)]
    pub family: Option<String>,
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub cost: Option<ModelCost>,
    pub limits: ModelLimits,
    pub status: ModelStatus,
    #[serde(default)]
    pub release_date: Option<String>,
}

/// Raw shape of an entry in the `models.dev` catalog, used only to parse
/// the network/on-disk payload before flattening into `ModelInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawModel {
    id: String,
    name: String,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    attachment: bool,
    #[serde(default)]
    reasoning: bool,
    #[serde(default)]
    temperature: bool,
    #[serde(default)]
    tool_call: bool,
    #[serde(default)]
    interleaved: Option<serde_json::Value>,
    #[serde(default)]
    cost: Option<ModelCost>,
    limit: RawLimit,
    #[serde(default)]
    modalities: Option<RawModalities>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawLimit {
    context: u64,
    output: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawModalities {
    input: Vec<String>,
    output: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawProvider {
    models: HashMap<String, RawModel>,
}

type RawCatalog = HashMap<String, RawProvider>;

fn parse_status(raw: Option<&str>) -> ModelStatus {
    match raw {
        Some("deprecated") => ModelStatus::Deprecated,
        Some("alpha") => ModelStatus::Alpha,
        Some("beta") => ModelStatus::Beta,
        _ => ModelStatus::Active,
    }
}

fn flatten(provider_id: &str, raw: RawModel) -> ModelInfo {
    let interleaved = matches!(raw.interleaved, Some(serde_json::Value::Bool(true)))
        || matches!(raw.interleaved, Some(serde_json::Value::Object(_)));
    ModelInfo {
        id: raw.id.clone(),
        provider_id: provider_id.to_string(),
        name: raw.name,
        family: raw.family,
        capabilities: ModelCapabilities {
            temperature: raw.temperature,
            reasoning: raw.reasoning,
            attachment: raw.attachment,
            tool_call: raw.tool_call,
            input_modalities: raw
                .modalities
                .as_ref()
                .map(|m| m.input.clone())
                .unwrap_or_else(|| vec!["text".to_string()]),
            output_modalities: raw
                .modalities
                .map(|m| m.output)
                .unwrap_or_else(|| vec!["text".to_string()]),
            interleaved,
        },
        cost: raw.cost,
        limits: ModelLimits {
            context: raw.limit.context,
            output: raw.limit.output,
        },
        status: parse_status(raw.status.as_deref()),
        release_date: raw.release_date,
    }
}

/// Flattens the raw per-provider map into the registry's `{provider_id:
/// [ModelInfo]}` shape, dropping deprecated entries so callers never see
/// a model whose lifecycle has ended.
fn flatten_catalog(raw: RawCatalog) -> HashMap<String, Vec<ModelInfo>> {
    raw.into_iter()
        .map(|(provider_id, provider)| {
            let models = provider
                .models
                .into_values()
                .map(|m| flatten(&provider_id, m))
                .filter(|m| m.status != ModelStatus::Deprecated)
                .collect();
            (provider_id, models)
        })
        .collect()
}

/// The static bootstrap catalog, covering every supported provider's
/// flagship and small model so a fresh install with no network access
/// and no cache still has usable model metadata.
pub fn bootstrap_catalog() -> HashMap<String, Vec<ModelInfo>> {
    let mut catalog: HashMap<String, Vec<ModelInfo>> = HashMap::new();
    let entries: &[(&str, &str, &str, u64, u64, bool, bool)] = &[
        // provider_id, model_id, name, context, max_output, reasoning, tool_call
        ("anthropic", "claude-sonnet-4-5", "Claude Sonnet 4.5", 200_000, 64_000, true, true),
        ("anthropic", "claude-haiku-4-5", "Claude Haiku 4.5", 200_000, 64_000, false, true),
        ("openai", "gpt-5", "GPT-5", 400_000, 128_000, true, true),
        ("openai", "gpt-5-mini", "GPT-5 Mini", 400_000, 128_000, true, true),
        ("google", "gemini-2.5-pro", "Gemini 2.5 Pro", 1_048_576, 65_536, true, true),
        ("google", "gemini-2.5-flash", "Gemini 2.5 Flash", 1_048_576, 65_536, true, true),
        ("bedrock", "anthropic.claude-sonnet-4-5-v1:0", "Claude Sonnet 4.5 (Bedrock)", 200_000, 64_000, true, true),
        ("copilot", "gpt-5", "GPT-5 (Copilot)", 128_000, 16_384, true, true),
        ("copilot", "claude-sonnet-4.5", "Claude Sonnet 4.5 (Copilot)", 200_000, 16_384, true, true),
        ("azure", "gpt-4o", "GPT-4o (Azure)", 128_000, 16_384, false, true),
        ("groq", "llama-3.3-70b-versatile", "Llama 3.3 70B (Groq)", 128_000, 32_768, false, true),
        ("openrouter", "anthropic/claude-sonnet-4.5", "Claude Sonnet 4.5 (OpenRouter)", 200_000, 64_000, true, true),
        ("xai", "grok-4", "Grok 4", 256_000, 64_000, true, true),
        ("xai", "grok-4-mini", "Grok 4 Mini", 256_000, 64_000, true, true),
        ("deepseek", "deepseek-chat", "DeepSeek Chat", 64_000, 8_192, false, true),
        ("deepseek", "deepseek-reasoner", "DeepSeek Reasoner", 64_000, 8_192, true, true),
        ("mistral", "mistral-large-latest", "Mistral Large", 128_000, 32_768, false, true),
        ("cohere", "command-r-plus", "Command R+", 128_000, 4_096, false, true),
        ("together", "meta-llama/Llama-3.3-70B-Instruct-Turbo", "Llama 3.3 70B (Together)", 128_000, 8_192, false, true),
        ("perplexity", "sonar-pro", "Sonar Pro", 200_000, 8_192, false, false),
        ("cerebras", "llama-3.3-70b", "Llama 3.3 70B (Cerebras)", 128_000, 8_192, false, true),
        ("deepinfra", "meta-llama/Llama-3.3-70B-Instruct", "Llama 3.3 70B (DeepInfra)", 128_000, 8_192, false, true),
        ("replicate", "meta/meta-llama-3.3-70b-instruct", "Llama 3.3 70B (Replicate)", 128_000, 8_192, false, false),
        ("cloudflare", "@cf/meta/llama-3.3-70b-instruct-fp8-fast", "Llama 3.3 70B (Workers AI)", 24_000, 4_096, false, false),
        ("gitlab", "claude-sonnet-4-5", "Claude Sonnet 4.5 (GitLab Duo)", 200_000, 64_000, true, true),
        ("vertex", "gemini-2.5-pro", "Gemini 2.5 Pro (Vertex)", 1_048_576, 65_536, true, true),
    ];

    for (provider_id, model_id, name, context, output, reasoning, tool_call) in entries {
        catalog.entry(provider_id.to_string()).or_default().push(ModelInfo {
            id: model_id.to_string(),
            provider_id: provider_id.to_string(),
            name: name.to_string(),
            family: None,
            capabilities: ModelCapabilities {
                temperature: true,
                reasoning: *reasoning,
                attachment: false,
                tool_call: *tool_call,
                input_modalities: vec!["text".to_string()],
                output_modalities: vec!["text".to_string()],
                interleaved: false,
            },
            cost: None,
            limits: ModelLimits {
                context: *context,
                output: *output,
            },
            status: ModelStatus::Active,
            release_date: None,
        });
    }
    catalog
}

/// Per-provider preference order for "default" and "small" model
/// selection, applied over whatever models are actually present in the
/// loaded catalog.
fn default_model_preferences(provider_id: &str) -> &'static [&'static str] {
    match provider_id {
        "anthropic" => &["claude-sonnet-4-5", "claude-haiku-4-5"],
        "openai" => &["gpt-5", "gpt-5-mini"],
        "google" | "vertex" => &["gemini-2.5-pro", "gemini-2.5-flash"],
        "copilot" => &["claude-sonnet-4.5", "gpt-5"],
        "xai" => &["grok-4", "grok-4-mini"],
        "deepseek" => &["deepseek-chat", "deepseek-reasoner"],
        _ => &[],
    }
}

fn small_model_preferences(provider_id: &str) -> &'static [&'static str] {
    match provider_id {
        "anthropic" => &["claude-haiku-4-5"],
        "openai" => &["gpt-5-mini"],
        "google" | "vertex" => &["gemini-2.5-flash"],
        "xai" => &["grok-4-mini"],
        _ => &[],
    }
}

struct CacheState {
    catalog: HashMap<String, Vec<ModelInfo>>,
    loaded_at: Instant,
}

/// Caches the merged model catalog in-process: on-disk cache (if present
/// and not 24h stale) wins over a network fetch, and in-process
/// refreshes are debounced to once per hour regardless of caller
/// frequency.
pub struct ModelsRegistry {
    state: Arc<RwLock<Option<CacheState>>>,
    cache_path: PathBuf,
}

impl ModelsRegistry {
    pub fn new(cache_path: PathBuf) -> Self {
        Self {
            state: Arc::new(RwLock::new(None)),
            cache_path,
        }
    }

    /// Returns the current catalog, merged with the static bootstrap
    /// entries (bootstrap fills gaps; a loaded model of the same id wins).
    pub async fn get(&self) -> HashMap<String, Vec<ModelInfo>> {
        {
            let guard = self.state.read().await;
            if let Some(state) = guard.as_ref() {
                if state.loaded_at.elapsed() < REFRESH_DEBOUNCE {
                    return merge_with_bootstrap(state.catalog.clone());
                }
            }
        }
        self.load().await
    }

    async fn load(&self) -> HashMap<String, Vec<ModelInfo>> {
        if let Some(catalog) = self.read_disk_cache_if_fresh().await {
            let mut guard = self.state.write().await;
            *guard = Some(CacheState {
                catalog: catalog.clone(),
                loaded_at: Instant::now(),
            });
            return merge_with_bootstrap(catalog);
        }
        self.fetch().await
    }

    async fn read_disk_cache_if_fresh(&self) -> Option<HashMap<String, Vec<ModelInfo>>> {
        let content = tokio::fs::read_to_string(&self.cache_path).await.ok()?;
        let cache_file: CacheFile = serde_json::from_str(&content).ok()?;
        let age_secs = chrono::Utc::now()
            .signed_duration_since(cache_file.fetched_at)
            .num_seconds();
        if age_secs > CACHE_STALE_AFTER.as_secs() as i64 {
            return None;
        }
        Some(flatten_catalog(cache_file.data))
    }

    /// Forces a network refresh, bypassing both the in-process debounce
    /// and the on-disk staleness check.
    pub async fn refresh(&self) -> HashMap<String, Vec<ModelInfo>> {
        self.fetch().await
    }

    async fn fetch(&self) -> HashMap<String, Vec<ModelInfo>> {
        let result = reqwest::Client::new()
            .get(MODELS_DEV_URL)
            .header("User-Agent", "dcode-provider")
            .timeout(Duration::from_secs(10))
            .send()
            .await;

        let catalog = match result {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => match serde_json::from_str::<RawCatalog>(&text) {
                    Ok(raw) => {
                        let cache_file = CacheFile {
                            fetched_at: chrono::Utc::now(),
                            data: raw.clone(),
                        };
                        if let Ok(serialized) = serde_json::to_string(&cache_file) {
                            let _ = tokio::fs::write(&self.cache_path, serialized).await;
                        }
                        flatten_catalog(raw)
                    }
                    Err(_) => HashMap::new(),
                },
                Err(_) => HashMap::new(),
            },
            _ => HashMap::new(),
        };

        let mut guard = self.state.write().await;
        *guard = Some(CacheState {
            catalog: catalog.clone(),
            loaded_at: Instant::now(),
        });
        merge_with_bootstrap(catalog)
    }

    pub async fn list_models_for_provider(&self, provider_id: &str) -> Vec<ModelInfo> {
        self.get()
            .await
            .remove(provider_id)
            .unwrap_or_default()
    }

    pub async fn get_model(&self, provider_id: &str, model_id: &str) -> Option<ModelInfo> {
        self.list_models_for_provider(provider_id)
            .await
            .into_iter()
            .find(|m| m.id == model_id)
    }

    /// Deprecated models are excluded unless no active alternative exists
    /// for that provider, matching the merge-time filtering requirement.
    pub async fn get_default_model(&self, provider_id: &str) -> Option<ModelInfo> {
        let models = self.list_models_for_provider(provider_id).await;
        pick_preferred(&models, default_model_preferences(provider_id))
    }

    pub async fn get_small_model(&self, provider_id: &str) -> Option<ModelInfo> {
        let models = self.list_models_for_provider(provider_id).await;
        pick_preferred(&models, small_model_preferences(provider_id))
            .or_else(|| smallest_active(&models))
    }
}

fn pick_preferred(models: &[ModelInfo], preferences: &[&str]) -> Option<ModelInfo> {
    for candidate in preferences {
        if let Some(m) = models
            .iter()
            .find(|m| m.id == *candidate && m.status != ModelStatus::Deprecated)
        {
            return Some(m.clone());
        }
    }
    models
        .iter()
        .find(|m| m.status == ModelStatus::Active)
        .cloned()
}

fn smallest_active(models: &[ModelInfo]) -> Option<ModelInfo> {
    models
        .iter()
        .filter(|m| m.status != ModelStatus::Deprecated)
        .min_by_key(|m| m.limits.output)
        .cloned()
}

fn merge_with_bootstrap(
    mut loaded: HashMap<String, Vec<ModelInfo>>,
) -> HashMap<String, Vec<ModelInfo>> {
    for (provider_id, bootstrap_models) in bootstrap_catalog() {
        let entry = loaded.entry(provider_id).or_default();
        for bm in bootstrap_models {
            if !entry.iter().any(|m| m.id == bm.id) {
                entry.push(bm);
            }
        }
    }
    loaded
}

impl Default for ModelsRegistry {
    fn default() -> Self {
        let cache_path = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("dcode")
            .join("models.json");
        Self::new(cache_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_catalog_covers_every_supported_provider() {
        let catalog = bootstrap_catalog();
        for provider in [
            "anthropic", "openai", "google", "bedrock", "copilot", "azure", "groq",
            "openrouter", "xai", "deepseek", "mistral", "cohere", "together", "perplexity",
            "cerebras", "deepinfra", "replicate", "cloudflare", "gitlab", "vertex",
        ] {
            assert!(
                catalog.contains_key(provider) && !catalog[provider].is_empty(),
                "missing bootstrap entry for {provider}"
            );
        }
    }

    #[test]
    fn deprecated_models_are_skipped_by_preference_pick() {
        let models = vec![
            ModelInfo {
                id: "old".into(),
                provider_id: "anthropic".into(),
                name: "Old".into(),
                family: None,
                capabilities: ModelCapabilities::default(),
                cost: None,
                limits: ModelLimits { context: 1000, output: 100 },
                status: ModelStatus::Deprecated,
                release_date: None,
            },
            ModelInfo {
                id: "new".into(),
                provider_id: "anthropic".into(),
                name: "New".into(),
                family: None,
                capabilities: ModelCapabilities::default(),
                cost: None,
                limits: ModelLimits { context: 2000, output: 200 },
                status: ModelStatus::Active,
                release_date: None,
            },
        ];
        let picked = pick_preferred(&models, &["old", "new"]).unwrap();
        assert_eq!(picked.id, "new");
    }

    #[tokio::test]
    async fn get_default_model_falls_back_to_bootstrap_when_cache_empty() {
        let cache_path = std::env::temp_dir().join(format!("dcode-models-test-{}.json", std::process::id()));
        let registry = ModelsRegistry::new(cache_path);
        // No network, no cache file present: merge_with_bootstrap alone
        // supplies every provider's flagship model.
        let model = registry.get_default_model("anthropic").await;
        assert!(model.is_some());
        assert_eq!(model.unwrap().id, "claude-sonnet-4-5");
    }

    #[test]
    fn flatten_maps_interleaved_object_to_true() {
        let raw = RawModel {
            id: "m".into(),
            name: "M".into(),
            family: None,
            release_date: None,
            attachment: false,
            reasoning: false,
            temperature: true,
            tool_call: true,
            interleaved: Some(serde_json::json!({"field": "thinking"})),
            cost: None,
            limit: RawLimit { context: 100, output: 10 },
            modalities: None,
            status: None,
        };
        let info = flatten("anthropic", raw);
        assert!(info.capabilities.interleaved);
        assert_eq!(info.status, ModelStatus::Active);
    }
}
