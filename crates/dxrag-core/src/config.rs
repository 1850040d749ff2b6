//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys split on `__`, e.g. `APP_LLM__PROVIDER=anthropic`).
//! Every setting has a default so an empty figment yields a usable [`Settings`].

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let base_dir = env::current_dir()?;
        let config = Self { figment, base_dir };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Build from an explicit figment; relative paths resolve against `base_dir`.
    pub fn from_figment(figment: Figment, base_dir: impl Into<PathBuf>) -> Self {
        Self { figment, base_dir: base_dir.into() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view over the whole figment with data paths resolved.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        settings.resolve_paths(&self.base_dir);
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            // Fake embeddings produce a silently useless index.
            let fake = env::var("APP_USE_FAKE_EMBEDDINGS").unwrap_or_default();
            if fake == "1" || fake.eq_ignore_ascii_case("true") {
                anyhow::bail!("APP_USE_FAKE_EMBEDDINGS must not be set in production");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub models: ModelSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub engine: EngineSettings,
}

impl Settings {
    pub fn resolve_paths(&mut self, base: &Path) {
        self.data.docs_dir = resolve_with_base(base, self.data.docs_dir.to_string_lossy());
        self.data.index_dir = resolve_with_base(base, self.data.index_dir.to_string_lossy());
        self.models.dir = resolve_with_base(base, self.models.dir.to_string_lossy());
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Configuration("chunking.chunk_size must be positive".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Configuration(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k_reranked == 0 {
            return Err(Error::Configuration("retrieval.top_k_reranked must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Configuration(format!("llm.temperature {} out of range", self.llm.temperature)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub docs_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { docs_dir: PathBuf::from("medical_docs"), index_dir: PathBuf::from("medical_index") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1200, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Directory holding one sub-directory per model name.
    pub dir: PathBuf,
    pub embedding: String,
    pub cross_encoder: String,
    pub use_cross_encoder: bool,
    pub max_len: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
            embedding: "sentence-transformers/all-MiniLM-L6-v2".into(),
            cross_encoder: "cross-encoder/ms-marco-MiniLM-L-6-v2".into(),
            use_cross_encoder: true,
            max_len: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_initial: usize,
    pub top_k_lexical: usize,
    pub lexical_variants: usize,
    pub top_k_reranked: usize,
    pub passage_chars: usize,
    pub context_chars: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Row count at which an IVF-PQ index is trained instead of flat search.
    pub ann_threshold: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k_initial: 15,
            top_k_lexical: 8,
            lexical_variants: 2,
            top_k_reranked: 6,
            passage_chars: 500,
            context_chars: 800,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            ann_threshold: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: String,
    /// Empty means the provider's default model.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self { provider: "openai".into(), model: String::new(), temperature: 0.1, max_tokens: 4096, timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub web_search: bool,
    /// `multi-stage` or `single-shot`.
    pub pipeline: String,
    pub thin_context_chars: usize,
    pub web_results: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { web_search: true, pipeline: "multi-stage".into(), thin_context_chars: 300, web_results: 5 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
