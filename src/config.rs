use anyhow::{Context, Result};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::chunker::DEFAULT_MAX_SENTENCES;

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const ENV_PREFIX: &str = "INTELLIJECT";
pub const CONFIG_FILE: &str = "intelliject_config";

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_DATABASE_PATH: &str = "intelliject.db";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_HASHING_DIMENSIONS: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Exact,
    Ann,
    Hybrid,
}

impl FromStr for SearchMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(SearchMethod::Exact),
            "ann" => Ok(SearchMethod::Ann),
            "hybrid" => Ok(SearchMethod::Hybrid),
            other => anyhow::bail!("unknown search method '{}' (expected exact, ann or hybrid)", other),
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::Exact => "exact",
            SearchMethod::Ann => "ann",
            SearchMethod::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// How far an excerpt returned by the model is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcerptPolicy {
    /// Keep only excerpt sentences that literally occur in the chunk.
    Verified,
    /// Keep whatever the model returned.
    Permissive,
}

impl FromStr for ExcerptPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" => Ok(ExcerptPolicy::Verified),
            "permissive" => Ok(ExcerptPolicy::Permissive),
            other => anyhow::bail!("unknown excerpt policy '{}' (expected verified or permissive)", other),
        }
    }
}

impl fmt::Display for ExcerptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExcerptPolicy::Verified => "verified",
            ExcerptPolicy::Permissive => "permissive",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    /// Local, deterministic; embeddings only.
    Hashing,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "hashing" | "local" => Ok(ProviderKind::Hashing),
            other => anyhow::bail!("unknown provider '{}' (expected openai or hashing)", other),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Hashing => "hashing",
        })
    }
}

/// Credentials and transport settings handed to a provider constructor.
#[derive(Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub model_name: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub batch_size: usize,
    pub dimensions: Option<usize>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key: Some(api_key.into()),
            model_name: model_name.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            batch_size: 64,
            dimensions: None,
        }
    }

    fn masked_key(&self) -> String {
        match self.api_key.as_deref() {
            None | Some("") => "<unset>".to_string(),
            Some(key) if key.len() <= 8 => "****".to_string(),
            Some(key) => format!("{}****", key.chars().take(4).collect::<String>()),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &self.masked_key())
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("batch_size", &self.batch_size)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[derive(Deserialize, Default)]
struct RawProviderConfig {
    provider: Option<String>,
    api_key: Option<String>,
    model_name: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<usize>,
    batch_size: Option<usize>,
    dimensions: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RawSettings {
    database_path: Option<String>,
    max_sentences: Option<usize>,
    top_k: Option<usize>,
    search_method: Option<String>,
    ann_num_tables: Option<usize>,
    ann_num_projections: Option<usize>,
    excerpt_policy: Option<String>,
    infer_subtopics: Option<bool>,
    cache_indices: Option<bool>,
    verbose: Option<bool>,
    #[serde(default)]
    embedding: RawProviderConfig,
    #[serde(default)]
    completion: RawProviderConfig,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,
    pub max_sentences: usize,
    pub top_k: usize,
    pub search_method: SearchMethod,
    pub ann_num_tables: Option<usize>,
    pub ann_num_projections: Option<usize>,
    pub excerpt_policy: ExcerptPolicy,
    pub infer_subtopics: bool,
    pub cache_indices: bool,
    pub verbose: bool,
    pub embedding: ProviderConfig,
    pub completion: ProviderConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            max_sentences: DEFAULT_MAX_SENTENCES,
            top_k: DEFAULT_TOP_K,
            search_method: SearchMethod::Exact,
            ann_num_tables: None,
            ann_num_projections: None,
            excerpt_policy: ExcerptPolicy::Verified,
            infer_subtopics: false,
            cache_indices: false,
            verbose: false,
            embedding: ProviderConfig {
                kind: ProviderKind::OpenAi,
                api_key: None,
                model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                timeout_secs: 30,
                max_retries: 3,
                batch_size: 64,
                dimensions: None,
            },
            completion: ProviderConfig {
                kind: ProviderKind::OpenAi,
                api_key: None,
                model_name: DEFAULT_COMPLETION_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                timeout_secs: 60,
                max_retries: 3,
                batch_size: 1,
                dimensions: None,
            },
        }
    }
}

impl Settings {
    /// Resolve settings from `intelliject_config.*`, then `INTELLIJECT_*`
    /// variables (nested keys separated by `__`), then plain environment
    /// fallbacks such as `OPENAI_API_KEY`, then defaults.
    pub fn new() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;
        let raw: RawSettings = config
            .try_deserialize()
            .context("invalid configuration values")?;
        Self::resolve(raw)
    }

    fn resolve(raw: RawSettings) -> Result<Self> {
        let defaults = Settings::default();

        let database_path = raw
            .database_path
            .or_else(|| env::var("DATABASE_PATH").ok())
            .unwrap_or(defaults.database_path);

        let max_sentences = raw.max_sentences.unwrap_or(defaults.max_sentences);
        if max_sentences == 0 {
            anyhow::bail!("max_sentences must be at least 1");
        }

        let search_method = raw
            .search_method
            .as_deref()
            .map(str::parse::<SearchMethod>)
            .transpose()?
            .unwrap_or(defaults.search_method);

        let excerpt_policy = raw
            .excerpt_policy
            .as_deref()
            .map(str::parse::<ExcerptPolicy>)
            .transpose()?
            .unwrap_or(defaults.excerpt_policy);

        let shared_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let embedding = resolve_provider(raw.embedding, defaults.embedding, shared_key.clone())
            .context("invalid embedding provider settings")?;
        let completion = resolve_provider(raw.completion, defaults.completion, shared_key)
            .context("invalid completion provider settings")?;

        let verbose = raw.verbose.unwrap_or_else(|| {
            env::var("INTELLIJECT_VERBOSE").map_or(false, |v| v.eq_ignore_ascii_case("true"))
        });

        Ok(Self {
            database_path,
            max_sentences,
            top_k: raw.top_k.unwrap_or(defaults.top_k),
            search_method,
            ann_num_tables: raw.ann_num_tables,
            ann_num_projections: raw.ann_num_projections,
            excerpt_policy,
            infer_subtopics: raw.infer_subtopics.unwrap_or(defaults.infer_subtopics),
            cache_indices: raw.cache_indices.unwrap_or(defaults.cache_indices),
            verbose,
            embedding,
            completion,
        })
    }

    pub fn print_config(&self) {
        println!("database_path={}", self.database_path);
        println!("max_sentences={}", self.max_sentences);
        println!("top_k={}", self.top_k);
        println!("search_method={}", self.search_method);
        println!(
            "ann_num_tables={}",
            self.ann_num_tables.map_or("auto".to_string(), |n| n.to_string())
        );
        println!(
            "ann_num_projections={}",
            self.ann_num_projections.map_or("auto".to_string(), |n| n.to_string())
        );
        println!("excerpt_policy={}", self.excerpt_policy);
        println!("infer_subtopics={}", self.infer_subtopics);
        println!("cache_indices={}", self.cache_indices);
        for (name, provider) in [("embedding", &self.embedding), ("completion", &self.completion)] {
            println!("{}.provider={}", name, provider.kind);
            println!("{}.model_name={}", name, provider.model_name);
            println!("{}.base_url={}", name, provider.base_url);
            println!("{}.api_key={}", name, provider.masked_key());
            println!("{}.timeout_secs={}", name, provider.timeout_secs);
            println!("{}.max_retries={}", name, provider.max_retries);
        }
    }
}

fn resolve_provider(
    raw: RawProviderConfig,
    defaults: ProviderConfig,
    shared_key: Option<String>,
) -> Result<ProviderConfig> {
    let kind = raw
        .provider
        .as_deref()
        .map(str::parse::<ProviderKind>)
        .transpose()?
        .unwrap_or(defaults.kind);

    let dimensions = raw.dimensions.or(match kind {
        ProviderKind::Hashing => Some(DEFAULT_HASHING_DIMENSIONS),
        ProviderKind::OpenAi => None,
    });
    if dimensions == Some(0) {
        anyhow::bail!("dimensions must be positive");
    }

    let batch_size = raw.batch_size.unwrap_or(defaults.batch_size);
    if batch_size == 0 {
        anyhow::bail!("batch_size must be positive");
    }

    Ok(ProviderConfig {
        kind,
        api_key: raw.api_key.filter(|k| !k.trim().is_empty()).or(shared_key),
        model_name: raw.model_name.unwrap_or(defaults.model_name),
        base_url: raw.base_url.unwrap_or(defaults.base_url),
        timeout_secs: raw.timeout_secs.unwrap_or(defaults.timeout_secs),
        max_retries: raw.max_retries.unwrap_or(defaults.max_retries).max(1),
        batch_size,
        dimensions,
    })
}
