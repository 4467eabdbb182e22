//! Cache configuration and statistics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::keys::CacheNamespace;

/// Which backend a manager should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process TTL map.
    #[default]
    Memory,
    /// Redis server.
    Redis,
    /// No caching at all.
    Disabled,
}

impl std::str::FromStr for BackendKind {
    type Err = vitrine_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(vitrine_core::Error::config(format!(
                "unknown cache backend '{other}' (expected memory, redis, or disabled)"
            ))),
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: BackendKind,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// TTL for query embeddings, in seconds.
    #[serde(default = "default_embedding_ttl")]
    pub embedding_ttl_secs: u64,

    /// TTL for search responses, in seconds.
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,

    /// TTL for product lookups, in seconds.
    #[serde(default = "default_product_ttl")]
    pub product_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_embedding_ttl() -> u64 {
    24 * 60 * 60
}

fn default_search_ttl() -> u64 {
    60 * 60
}

fn default_product_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            redis_url: default_redis_url(),
            timeout_ms: default_timeout_ms(),
            embedding_ttl_secs: default_embedding_ttl(),
            search_ttl_secs: default_search_ttl(),
            product_ttl_secs: default_product_ttl(),
        }
    }
}

impl CacheConfig {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default TTL for a namespace.
    pub fn ttl_for(&self, namespace: CacheNamespace) -> Duration {
        let secs = match namespace {
            CacheNamespace::TextEmbedding | CacheNamespace::ImageEmbedding => {
                self.embedding_ttl_secs
            }
            CacheNamespace::Search => self.search_ttl_secs,
            CacheNamespace::Product => self.product_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Raw counters reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStats {
    /// Live keys.
    pub keys: usize,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
}

/// Cache statistics as reported by [`CacheManager::stats`](crate::CacheManager::stats).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Whether the backend answered.
    pub available: bool,
    /// Backend name.
    pub backend: String,
    /// Live keys.
    pub keys: usize,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 when there were no lookups.
    pub hit_rate: f64,
}

impl CacheStats {
    /// Stats for a backend that could not be reached.
    pub fn unavailable(backend: impl Into<String>) -> Self {
        Self {
            available: false,
            backend: backend.into(),
            keys: 0,
            hits: 0,
            misses: 0,
            hit_rate: 0.0,
        }
    }

    /// Stats built from backend counters.
    pub fn from_backend(backend: impl Into<String>, raw: BackendStats) -> Self {
        let lookups = raw.hits + raw.misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            raw.hits as f64 / lookups as f64
        };
        Self {
            available: true,
            backend: backend.into(),
            keys: raw.keys,
            hits: raw.hits,
            misses: raw.misses,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.timeout(), Duration::from_millis(250));
        assert_eq!(
            config.ttl_for(CacheNamespace::TextEmbedding),
            Duration::from_secs(86_400)
        );
        assert_eq!(config.ttl_for(CacheNamespace::Search), Duration::from_secs(3_600));
        assert_eq!(config.ttl_for(CacheNamespace::Product), Duration::from_secs(86_400));
    }

    #[test]
    fn test_cache_config_partial_deserialize() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"backend": "redis", "search_ttl_secs": 60}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Redis);
        assert_eq!(config.search_ttl_secs, 60);
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("Redis".parse::<BackendKind>().unwrap(), BackendKind::Redis);
        assert_eq!("off".parse::<BackendKind>().unwrap(), BackendKind::Disabled);
        assert!("memcached".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::from_backend(
            "memory",
            BackendStats {
                keys: 2,
                hits: 3,
                misses: 1,
            },
        );
        assert!((stats.hit_rate - 0.75).abs() < 1e-9);
        assert_eq!(CacheStats::from_backend("memory", BackendStats::default()).hit_rate, 0.0);
        assert!(!CacheStats::unavailable("redis").available);
    }
}
