//! The `vitrine` application: service wiring and command dispatch.

use crate::cli::{CacheAction, CliArgs, Command};
use crate::config::{EncoderProvider, EncoderSettings, VitrineConfig};
use crate::{config_handlers, index_handlers, search_handlers};
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vitrine_cache::CacheManager;
use vitrine_core::traits::ConfigProvider;
use vitrine_core::{Error, Result};
use vitrine_rank::RankingPipeline;
use vitrine_vector::{EmbeddingEncoder, MockEncoder, RetryingEncoder, VectorStore};

// ============================================================================
// Vitrine
// ============================================================================

/// The command-line application.
#[derive(Debug)]
pub struct Vitrine {
    config: VitrineConfig,
    version: String,
}

impl Vitrine {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        Ok(Self::new(VitrineConfig::load(args.config.as_deref())?))
    }

    /// Create from an already loaded configuration.
    pub fn new(config: VitrineConfig) -> Self {
        Self {
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &VitrineConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
    /// `log` records from the library crates reach the same subscriber.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // A subscriber may already be installed (e.g. in tests).
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Run the CLI with the given arguments.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        let Some(command) = args.command else {
            println!("vitrine {}, use --help for usage", self.version);
            return Ok(());
        };

        match command {
            Command::Version => {
                println!("vitrine {}", self.version);
                Ok(())
            }
            Command::Config(config_cmd) => {
                config_handlers::handle_config_command(args.config.as_deref(), config_cmd.command)
            }
            command => {
                let pipeline = self.open_pipeline().await?;
                self.dispatch(&pipeline, command).await
            }
        }
    }

    async fn dispatch(&self, pipeline: &RankingPipeline, command: Command) -> Result<()> {
        let index_dir = self.config.index_path()?;
        match command {
            Command::Search(search_args) => {
                let query = search_handlers::build_query(self.config.ranking.base_query(), search_args)?;
                print_json(&search_handlers::handle_search(pipeline, &query).await?)
            }
            Command::Index(index_args) => {
                print_json(&index_handlers::handle_index(pipeline, &index_dir, &index_args).await?)
            }
            Command::Stats => print_json(&index_handlers::handle_stats(pipeline).await),
            Command::Product { id } => print_json(&search_handlers::handle_product(pipeline, &id).await?),
            Command::Similar { id, top_k } => {
                print_json(&search_handlers::handle_similar(pipeline, &id, top_k)?)
            }
            Command::Remove { id } => {
                index_handlers::handle_remove(pipeline, &index_dir, &id).await?;
                println!("Removed {id}");
                Ok(())
            }
            Command::Compact => {
                let reclaimed = index_handlers::handle_compact(pipeline, &index_dir).await?;
                println!("Reclaimed {reclaimed} slots");
                Ok(())
            }
            Command::Cache(cache_cmd) => match cache_cmd.command {
                CacheAction::Flush { namespace } => {
                    let removed =
                        search_handlers::handle_cache_flush(pipeline, namespace.as_deref()).await?;
                    println!("Flushed {removed} cache entries");
                    Ok(())
                }
                CacheAction::Stats => print_json(&search_handlers::handle_cache_stats(pipeline).await),
            },
            Command::Health => print_json(&index_handlers::handle_health(pipeline).await),
            Command::Version | Command::Config(_) => Ok(()),
        }
    }

    /// Load the index and assemble the pipeline described by the config.
    pub async fn open_pipeline(&self) -> Result<RankingPipeline> {
        let dimension = self.config.index.dimension;
        let encoder = build_encoder(&self.config.encoder, dimension)?;
        let index_dir = self.config.index_path()?;
        let store = VectorStore::load(&index_dir, self.config.index.vector_config());
        tracing::debug!(
            "Opened index at {} with {} products",
            index_dir.display(),
            store.len()
        );
        let cache = CacheManager::from_config(self.config.cache.clone()).await;

        Ok(RankingPipeline::new(
            store.into_shared(),
            encoder,
            cache,
            self.config.ranking.pipeline_config(),
        ))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// The configured encoder, wrapped with retries.
///
/// The encoder dimension must match the index dimension.
pub fn build_encoder(settings: &EncoderSettings, dimension: usize) -> Result<Arc<dyn EmbeddingEncoder>> {
    let inner: Arc<dyn EmbeddingEncoder> = match settings.provider {
        EncoderProvider::Mock => Arc::new(MockEncoder::new(dimension)),
        EncoderProvider::Fastembed => fastembed_encoder(settings)?,
    };
    if inner.dimension() != dimension {
        return Err(Error::dimension(dimension, inner.dimension()));
    }
    Ok(Arc::new(
        RetryingEncoder::new(inner).with_max_retries(settings.max_retries),
    ))
}

#[cfg(feature = "fastembed")]
fn fastembed_encoder(settings: &EncoderSettings) -> Result<Arc<dyn EmbeddingEncoder>> {
    let encoder = vitrine_vector::ClipEncoder::new(settings.model_cache_path.as_deref())?;
    Ok(Arc::new(encoder))
}

#[cfg(not(feature = "fastembed"))]
fn fastembed_encoder(_settings: &EncoderSettings) -> Result<Arc<dyn EmbeddingEncoder>> {
    Err(Error::config(
        "encoder provider 'fastembed' requires building vitrine with the `fastembed` feature",
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexSettings;
    use clap::Parser;
    use vitrine_cache::BackendKind;

    fn test_config(dir: &tempfile::TempDir) -> VitrineConfig {
        let mut config = VitrineConfig {
            index: IndexSettings {
                path: Some(dir.path().join("index").to_string_lossy().into_owned()),
                dimension: 16,
                ..IndexSettings::default()
            },
            ..VitrineConfig::default()
        };
        config.cache.backend = BackendKind::Memory;
        config
    }

    fn run_args(words: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("vitrine").chain(words.iter().copied()))
    }

    #[test]
    fn test_vitrine_new() {
        let app = Vitrine::new(VitrineConfig::default());
        assert_eq!(app.config().index.dimension, 512);
        assert!(!app.version.is_empty());
    }

    #[test]
    fn test_from_args_with_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[index]\ndimension = 24\n").unwrap();

        let args = run_args(&["--config", path.to_str().unwrap()]);
        let app = Vitrine::from_args(&args).unwrap();
        assert_eq!(app.config().index.dimension, 24);
    }

    #[test]
    fn test_build_encoder() {
        let encoder = build_encoder(&EncoderSettings::default(), 32).unwrap();
        assert_eq!(encoder.dimension(), 32);
        assert_eq!(encoder.name(), "mock");
    }

    #[cfg(not(feature = "fastembed"))]
    #[test]
    fn test_build_encoder_without_fastembed_feature() {
        let settings = EncoderSettings {
            provider: EncoderProvider::Fastembed,
            ..EncoderSettings::default()
        };
        assert!(matches!(build_encoder(&settings, 512), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_run_simple_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = Vitrine::new(test_config(&dir));
        let commands: [&[&str]; 5] = [&[], &["version"], &["health"], &["stats"], &["cache", "stats"]];
        for words in commands {
            assert!(app.run(run_args(words)).await.is_ok(), "{words:?}");
        }
    }

    #[tokio::test]
    async fn test_run_index_then_search() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = Vitrine::new(test_config(&dir));

        app.run(run_args(&["index", "--count", "12"])).await.unwrap();
        assert!(dir.path().join("index").join("metadata.json").exists());

        // A second process view of the same index.
        let pipeline = app.open_pipeline().await.unwrap();
        assert_eq!(pipeline.store().read().len(), 12);

        app.run(run_args(&["search", "red summer dress", "-k", "3"])).await.unwrap();
        app.run(run_args(&["product", "SYN00001"])).await.unwrap();
        app.run(run_args(&["similar", "SYN00001", "-k", "2"])).await.unwrap();
        app.run(run_args(&["remove", "SYN00001"])).await.unwrap();
        app.run(run_args(&["compact"])).await.unwrap();
        app.run(run_args(&["cache", "flush", "--namespace", "search"])).await.unwrap();

        let reopened = app.open_pipeline().await.unwrap();
        assert_eq!(reopened.store().read().len(), 11);
    }

    #[tokio::test]
    async fn test_run_reports_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let app = Vitrine::new(test_config(&dir));
        assert!(matches!(
            app.run(run_args(&["product", "missing"])).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            app.run(run_args(&["search"])).await,
            Err(Error::InvalidQuery(_))
        ));
        assert!(app.run(run_args(&["search", "dress", "--method", "cubic"])).await.is_err());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let app = Vitrine::new(VitrineConfig::default());
        app.init_logging(false, false);
        app.init_logging(true, false);
        app.init_logging(false, true);
    }
}
