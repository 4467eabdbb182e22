//! Configuration for the `vitrine` command.
//!
//! [`VitrineConfig`] loads from a TOML file, environment variables, and
//! defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `VITRINE_CONFIG` environment variable
//! 3. XDG default: `~/.config/vitrine/config.toml`
//! 4. Built-in defaults
//!
//! Environment overrides use `VITRINE_<SECTION>_<KEY>`, for example
//! `VITRINE_CACHE_REDIS_URL`.

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vitrine_cache::CacheConfig;
use vitrine_core::traits::ConfigProvider;
use vitrine_core::{Error, Result};
use vitrine_rank::{FusionMethod, RankingConfig, SearchQuery};
use vitrine_vector::{HybridFallback, VectorConfig};

// ============================================================================
// Configuration structs
// ============================================================================

/// Main configuration for the `vitrine` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitrineConfig {
    /// Vector index location and retrieval tuning.
    pub index: IndexSettings,

    /// Cache backend and TTLs.
    pub cache: CacheConfig,

    /// Query defaults and pipeline tuning.
    pub ranking: RankingSettings,

    /// Embedding model selection.
    pub encoder: EncoderSettings,
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding `products.index` and `metadata.json`.
    pub path: Option<String>,

    /// Embedding dimension.
    pub dimension: usize,

    /// Raw neighbours fetched per result in plain searches.
    pub overfetch_factor: usize,

    /// Raw neighbours fetched per result in hybrid searches.
    pub hybrid_factor: usize,

    /// Minimum hybrid candidate pool.
    pub hybrid_min_pool: usize,

    /// Treatment of candidates without raw embeddings.
    pub hybrid_fallback: HybridFallback,
}

/// Ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Default image weight for queries.
    pub image_weight: f32,

    /// Default text weight for queries.
    pub text_weight: f32,

    /// Default number of results.
    pub top_k: usize,

    /// Candidates retrieved per requested result.
    pub candidate_multiplier: usize,

    /// Default category diversity penalty.
    pub diversity_weight: f32,

    /// Default fusion method.
    pub fusion_method: FusionMethod,

    /// Install the built-in boost hooks.
    pub builtin_boosts: bool,
}

/// Which encoder implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderProvider {
    /// Deterministic hash-based embeddings, no model download.
    #[default]
    Mock,
    /// Local CLIP ViT-B/32 through fastembed.
    Fastembed,
}

/// Encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Encoder implementation.
    pub provider: EncoderProvider,

    /// Model download cache directory (fastembed only).
    pub model_cache_path: Option<String>,

    /// Retries on retryable encoder failures.
    pub max_retries: u32,
}

// ============================================================================
// Default implementations
// ============================================================================

impl Default for IndexSettings {
    fn default() -> Self {
        let vector = VectorConfig::default();
        Self {
            path: None,
            dimension: vector.dimension,
            overfetch_factor: vector.overfetch_factor,
            hybrid_factor: vector.hybrid_factor,
            hybrid_min_pool: vector.hybrid_min_pool,
            hybrid_fallback: vector.hybrid_fallback,
        }
    }
}

impl Default for RankingSettings {
    fn default() -> Self {
        let query = SearchQuery::default();
        let pipeline = RankingConfig::default();
        Self {
            image_weight: query.image_weight,
            text_weight: query.text_weight,
            top_k: query.top_k,
            candidate_multiplier: pipeline.candidate_multiplier,
            diversity_weight: query.diversity_weight,
            fusion_method: query.method,
            builtin_boosts: pipeline.builtin_boosts,
        }
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            provider: EncoderProvider::default(),
            model_cache_path: None,
            max_retries: 3,
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl IndexSettings {
    /// Store configuration for these settings.
    pub fn vector_config(&self) -> VectorConfig {
        VectorConfig {
            dimension: self.dimension,
            overfetch_factor: self.overfetch_factor,
            hybrid_factor: self.hybrid_factor,
            hybrid_min_pool: self.hybrid_min_pool,
            hybrid_fallback: self.hybrid_fallback,
            ..VectorConfig::default()
        }
    }

    /// The index directory: the configured path, else the platform data
    /// directory, else `./vitrine-index`.
    pub fn dir(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None => dirs::data_local_dir()
                .map(|d| d.join("vitrine").join("index"))
                .unwrap_or_else(|| PathBuf::from("vitrine-index")),
        }
    }
}

impl RankingSettings {
    /// Pipeline configuration for these settings.
    pub fn pipeline_config(&self) -> RankingConfig {
        RankingConfig {
            candidate_multiplier: self.candidate_multiplier,
            builtin_boosts: self.builtin_boosts,
        }
    }

    /// A query carrying these defaults.
    pub fn base_query(&self) -> SearchQuery {
        SearchQuery {
            image_weight: self.image_weight,
            text_weight: self.text_weight,
            top_k: self.top_k,
            method: self.fusion_method,
            diversity_weight: self.diversity_weight,
            ..SearchQuery::default()
        }
    }
}

// ============================================================================
// Config loading
// ============================================================================

impl VitrineConfig {
    /// Load configuration from file, environment, and defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level("VITRINE");
        env_opts.add_section("index");
        env_opts.add_section("cache");
        env_opts.add_section("ranking");
        env_opts.add_section("encoder");
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("VITRINE_CONFIG") {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("vitrine").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Flatten this config into `VITRINE_` environment variable pairs.
    pub fn to_env_vars(&self) -> Result<Vec<(String, String)>> {
        let value = toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut vars = Vec::new();
        flatten_toml_value(&value, "VITRINE", &mut vars);
        Ok(vars)
    }
}

// ============================================================================
// ConfigProvider implementation
// ============================================================================

impl ConfigProvider for VitrineConfig {
    fn project_name(&self) -> &str {
        "vitrine"
    }

    fn base_path(&self) -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|d| d.join("vitrine"))
            .ok_or_else(|| Error::config("Could not determine data directory for this platform"))
    }

    fn index_path(&self) -> Result<PathBuf> {
        Ok(self.index.dir())
    }
}

fn flatten_toml_value(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, val) in table {
                flatten_toml_value(val, &format!("{prefix}_{}", key.to_uppercase()), out);
            }
        }
        toml::Value::Array(arr) => {
            if let Ok(json) = serde_json::to_string(arr) {
                out.push((prefix.to_string(), json));
            }
        }
        toml::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        toml::Value::Integer(i) => out.push((prefix.to_string(), i.to_string())),
        toml::Value::Float(f) => out.push((prefix.to_string(), f.to_string())),
        toml::Value::Boolean(b) => out.push((prefix.to_string(), b.to_string())),
        toml::Value::Datetime(dt) => out.push((prefix.to_string(), dt.to_string())),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vitrine_cache::BackendKind;

    /// RAII guard for env var manipulation in tests.
    struct EnvGuard {
        key: String,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn new(key: &str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe { std::env::set_var(key, value) };
            Self {
                key: key.to_string(),
                prev,
            }
        }

        fn remove(key: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe { std::env::remove_var(key) };
            Self {
                key: key.to_string(),
                prev,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(val) => unsafe { std::env::set_var(&self.key, val) },
                None => unsafe { std::env::remove_var(&self.key) },
            }
        }
    }

    // ------------------------------------------------------------------------
    // Defaults
    // ------------------------------------------------------------------------

    #[test]
    fn test_vitrine_config_default() {
        let config = VitrineConfig::default();
        assert!(config.index.path.is_none());
        assert_eq!(config.index.dimension, 512);
        assert_eq!(config.index.hybrid_fallback, HybridFallback::IndexedVector);
        assert_eq!(config.cache.backend, BackendKind::Memory);
        assert_eq!(config.ranking.image_weight, 0.7);
        assert_eq!(config.ranking.text_weight, 0.3);
        assert_eq!(config.ranking.top_k, 10);
        assert_eq!(config.ranking.candidate_multiplier, 2);
        assert_eq!(config.ranking.fusion_method, FusionMethod::WeightedAvg);
        assert_eq!(config.encoder.provider, EncoderProvider::Mock);
        assert_eq!(config.encoder.max_retries, 3);
    }

    #[test]
    fn test_settings_conversions() {
        let config = VitrineConfig {
            index: IndexSettings {
                path: Some("/data/index".into()),
                dimension: 64,
                hybrid_fallback: HybridFallback::Skip,
                ..IndexSettings::default()
            },
            ranking: RankingSettings {
                top_k: 5,
                fusion_method: FusionMethod::ElementWise,
                builtin_boosts: false,
                ..RankingSettings::default()
            },
            ..VitrineConfig::default()
        };

        let vector = config.index.vector_config();
        assert_eq!(vector.dimension, 64);
        assert_eq!(vector.hybrid_fallback, HybridFallback::Skip);
        assert_eq!(config.index.dir(), PathBuf::from("/data/index"));

        let query = config.ranking.base_query();
        assert_eq!(query.top_k, 5);
        assert_eq!(query.method, FusionMethod::ElementWise);
        assert!(query.text.is_none());
        assert!(!config.ranking.pipeline_config().builtin_boosts);
    }

    #[test]
    fn test_config_provider() {
        let config = VitrineConfig {
            index: IndexSettings {
                path: Some("/srv/index".into()),
                ..IndexSettings::default()
            },
            ..VitrineConfig::default()
        };
        assert_eq!(config.project_name(), "vitrine");
        assert_eq!(config.index_path().unwrap(), PathBuf::from("/srv/index"));
    }

    #[test]
    fn test_index_dir_default_is_named() {
        let dir = IndexSettings::default().dir();
        assert!(dir.to_string_lossy().contains("vitrine"));
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    #[test]
    fn test_vitrine_config_from_toml() {
        let toml_str = r#"
            [index]
            path = "/srv/vitrine"
            dimension = 128
            hybrid_fallback = "skip"

            [cache]
            backend = "redis"
            redis_url = "redis://cache:6379/1"
            search_ttl_secs = 60

            [ranking]
            image_weight = 0.5
            text_weight = 0.5
            fusion_method = "concatenation"

            [encoder]
            provider = "fastembed"
            model_cache_path = "/models"
        "#;

        let config: VitrineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.index.path.as_deref(), Some("/srv/vitrine"));
        assert_eq!(config.index.dimension, 128);
        assert_eq!(config.index.hybrid_fallback, HybridFallback::Skip);
        assert_eq!(config.index.overfetch_factor, 3);
        assert_eq!(config.cache.backend, BackendKind::Redis);
        assert_eq!(config.cache.search_ttl_secs, 60);
        assert_eq!(config.cache.timeout_ms, 250);
        assert_eq!(config.ranking.image_weight, 0.5);
        assert_eq!(config.ranking.fusion_method, FusionMethod::Concatenation);
        assert_eq!(config.ranking.top_k, 10);
        assert_eq!(config.encoder.provider, EncoderProvider::Fastembed);
        assert_eq!(config.encoder.model_cache_path.as_deref(), Some("/models"));
    }

    #[test]
    fn test_vitrine_config_to_toml_round_trip() {
        let config = VitrineConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[index]"));
        assert!(toml_str.contains("[ranking]"));
        assert!(toml_str.contains("dimension = 512"));

        let parsed: VitrineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.index.dimension, config.index.dimension);
        assert_eq!(parsed.cache.redis_url, config.cache.redis_url);
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    #[test]
    fn test_vitrine_config_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [index]
                dimension = 32
                [encoder]
                provider = "mock"
            "#,
        )
        .unwrap();

        let config = VitrineConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.index.dimension, 32);
        assert_eq!(config.encoder.provider, EncoderProvider::Mock);
    }

    #[test]
    fn test_vitrine_config_load_defaults() {
        let config = VitrineConfig::load(Some("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.index.dimension, 512);
        assert_eq!(config.ranking.top_k, 10);
    }

    #[test]
    fn test_vitrine_config_load_env_overlay() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
                [cache]
                redis_url = "redis://file:6379/0"
            "#,
        )
        .unwrap();

        // confyg passes env values as strings, so only string fields overlay.
        let _guard = EnvGuard::new("VITRINE_CACHE_REDIS_URL", "redis://env:6379/0");
        let config = VitrineConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.cache.redis_url, "redis://env:6379/0");
    }

    // ------------------------------------------------------------------------
    // resolve_config_path
    // ------------------------------------------------------------------------

    #[test]
    fn test_resolve_config_path_explicit() {
        let path = VitrineConfig::resolve_config_path(Some("/explicit/config.toml"));
        assert_eq!(path, Some(PathBuf::from("/explicit/config.toml")));
    }

    #[test]
    fn test_resolve_config_path_env() {
        let _guard = EnvGuard::new("VITRINE_CONFIG", "/env/config.toml");
        let path = VitrineConfig::resolve_config_path(None);
        assert_eq!(path, Some(PathBuf::from("/env/config.toml")));
    }

    #[test]
    fn test_resolve_config_path_default() {
        let _guard = EnvGuard::remove("VITRINE_CONFIG");
        let path = VitrineConfig::resolve_config_path(None).unwrap();
        let p = path.to_string_lossy();
        assert!(p.contains("vitrine"));
        assert!(p.ends_with("config.toml"));
    }

    // ------------------------------------------------------------------------
    // to_env_vars
    // ------------------------------------------------------------------------

    #[test]
    fn test_vitrine_config_to_env_vars() {
        let vars = VitrineConfig::default().to_env_vars().unwrap();
        let map: HashMap<_, _> = vars.into_iter().collect();
        assert_eq!(map.get("VITRINE_INDEX_DIMENSION").unwrap(), "512");
        assert_eq!(map.get("VITRINE_CACHE_BACKEND").unwrap(), "memory");
        assert_eq!(map.get("VITRINE_ENCODER_PROVIDER").unwrap(), "mock");
        assert_eq!(map.get("VITRINE_RANKING_FUSION_METHOD").unwrap(), "weighted_avg");
        assert!(!map.contains_key("VITRINE_INDEX_PATH"));
    }
}
