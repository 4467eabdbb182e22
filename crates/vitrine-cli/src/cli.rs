//! CLI argument parsing and command definitions.

use clap::{Args, Parser, Subcommand};

// ============================================================================
// CLI argument types
// ============================================================================

/// Cross-modal product search.
#[derive(Parser, Debug)]
#[command(name = "vitrine", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "VITRINE_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the index by text, image, or both.
    Search(SearchArgs),

    /// Ingest products into the index.
    Index(IndexArgs),

    /// Show index and cache statistics.
    Stats,

    /// Show one product.
    Product {
        /// Product id.
        id: String,
    },

    /// Products similar to an indexed product.
    Similar {
        /// Product id.
        id: String,

        /// Number of results.
        #[arg(short = 'k', long, default_value = "10")]
        top_k: usize,
    },

    /// Remove a product from the index.
    Remove {
        /// Product id.
        id: String,
    },

    /// Drop tombstoned slots and rebuild the index.
    Compact,

    /// Cache operations.
    Cache(CacheCommand),

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,

    /// Check index and cache health.
    Health,
}

/// Arguments of `vitrine search`.
#[derive(Args, Debug, Default)]
pub struct SearchArgs {
    /// Query text.
    pub text: Option<String>,

    /// Query image file.
    #[arg(short, long)]
    pub image: Option<String>,

    /// Image weight (defaults to the configured value).
    #[arg(long)]
    pub image_weight: Option<f32>,

    /// Text weight (defaults to the configured value).
    #[arg(long)]
    pub text_weight: Option<f32>,

    /// Number of results.
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Fusion method: weighted_avg, concatenation, element_wise.
    #[arg(short, long)]
    pub method: Option<String>,

    /// Restrict to a category (repeatable).
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Minimum price.
    #[arg(long)]
    pub min_price: Option<f64>,

    /// Maximum price.
    #[arg(long)]
    pub max_price: Option<f64>,

    /// Minimum similarity score in [0, 1].
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Category diversity penalty in [0, 1].
    #[arg(long)]
    pub diversity: Option<f32>,

    /// Occasion context, e.g. "wedding".
    #[arg(long)]
    pub occasion: Option<String>,

    /// Mood context.
    #[arg(long)]
    pub mood: Option<String>,

    /// Season context.
    #[arg(long)]
    pub season: Option<String>,

    /// Bypass the result cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments of `vitrine index`.
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// JSON catalog file; the synthetic catalog is used when omitted.
    #[arg(short, long)]
    pub file: Option<String>,

    /// Number of synthetic products.
    #[arg(short = 'n', long, default_value = "200")]
    pub count: usize,

    /// Source name for file entries without one.
    #[arg(long, default_value = "file")]
    pub source: String,

    /// Skip image encoding.
    #[arg(long)]
    pub no_images: bool,

    /// Products encoded per batch.
    #[arg(long, default_value = "32")]
    pub batch_size: usize,

    /// Clear the index before ingesting.
    #[arg(long)]
    pub fresh: bool,
}

/// Cache-specific subcommands.
#[derive(Parser, Debug)]
pub struct CacheCommand {
    /// Cache subcommand to execute.
    #[command(subcommand)]
    pub command: CacheAction,
}

/// Available cache subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Delete cached entries.
    Flush {
        /// Only this namespace: text, image, search, product.
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Show cache statistics.
    Stats,
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "ranking.top_k").
        key: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Export configuration as environment variables.
    Export {
        /// Format as Docker --env flags.
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::parse_from(["vitrine"]);
        assert!(args.config.is_none());
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_flags() {
        let args = CliArgs::parse_from(["vitrine", "--verbose", "--config", "/etc/vitrine.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config.as_deref(), Some("/etc/vitrine.toml"));
    }

    // ------------------------------------------------------------------------
    // search
    // ------------------------------------------------------------------------

    #[test]
    fn test_search_text_only() {
        let args = CliArgs::parse_from(["vitrine", "search", "red dress"]);
        match args.command {
            Some(Command::Search(search)) => {
                assert_eq!(search.text.as_deref(), Some("red dress"));
                assert!(search.image.is_none());
                assert!(search.top_k.is_none());
                assert!(search.categories.is_empty());
                assert!(!search.no_cache);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_search_all_options() {
        let args = CliArgs::parse_from([
            "vitrine",
            "search",
            "summer dress",
            "--image",
            "query.png",
            "--image-weight",
            "0.4",
            "--text-weight",
            "0.6",
            "-k",
            "5",
            "--method",
            "element_wise",
            "--category",
            "Dresses",
            "--category",
            "Tops",
            "--min-price",
            "10",
            "--max-price",
            "99.5",
            "--min-score",
            "0.5",
            "--diversity",
            "0.3",
            "--occasion",
            "wedding",
            "--no-cache",
        ]);
        match args.command {
            Some(Command::Search(search)) => {
                assert_eq!(search.image.as_deref(), Some("query.png"));
                assert_eq!(search.image_weight, Some(0.4));
                assert_eq!(search.text_weight, Some(0.6));
                assert_eq!(search.top_k, Some(5));
                assert_eq!(search.method.as_deref(), Some("element_wise"));
                assert_eq!(search.categories, vec!["Dresses", "Tops"]);
                assert_eq!(search.min_price, Some(10.0));
                assert_eq!(search.max_price, Some(99.5));
                assert_eq!(search.min_score, Some(0.5));
                assert_eq!(search.diversity, Some(0.3));
                assert_eq!(search.occasion.as_deref(), Some("wedding"));
                assert!(search.mood.is_none());
                assert!(search.no_cache);
            }
            _ => panic!("Expected Search command"),
        }
    }

    // ------------------------------------------------------------------------
    // index and maintenance
    // ------------------------------------------------------------------------

    #[test]
    fn test_index_defaults() {
        let args = CliArgs::parse_from(["vitrine", "index"]);
        match args.command {
            Some(Command::Index(index)) => {
                assert!(index.file.is_none());
                assert_eq!(index.count, 200);
                assert_eq!(index.source, "file");
                assert_eq!(index.batch_size, 32);
                assert!(!index.no_images);
                assert!(!index.fresh);
            }
            _ => panic!("Expected Index command"),
        }
    }

    #[test]
    fn test_index_from_file() {
        let args = CliArgs::parse_from(["vitrine", "index", "--file", "catalog.json", "--fresh"]);
        match args.command {
            Some(Command::Index(index)) => {
                assert_eq!(index.file.as_deref(), Some("catalog.json"));
                assert!(index.fresh);
            }
            _ => panic!("Expected Index command"),
        }
    }

    #[test]
    fn test_product_commands() {
        let args = CliArgs::parse_from(["vitrine", "product", "SYN00001"]);
        assert!(matches!(args.command, Some(Command::Product { id }) if id == "SYN00001"));

        let args = CliArgs::parse_from(["vitrine", "similar", "SYN00001", "-k", "3"]);
        assert!(matches!(
            args.command,
            Some(Command::Similar { id, top_k: 3 }) if id == "SYN00001"
        ));

        let args = CliArgs::parse_from(["vitrine", "remove", "SYN00001"]);
        assert!(matches!(args.command, Some(Command::Remove { id }) if id == "SYN00001"));
    }

    #[test]
    fn test_simple_commands() {
        let parse = |word: &str| CliArgs::parse_from(["vitrine", word]).command;
        assert!(matches!(parse("stats"), Some(Command::Stats)));
        assert!(matches!(parse("compact"), Some(Command::Compact)));
        assert!(matches!(parse("version"), Some(Command::Version)));
        assert!(matches!(parse("health"), Some(Command::Health)));
    }

    // ------------------------------------------------------------------------
    // cache
    // ------------------------------------------------------------------------

    #[test]
    fn test_cache_flush_all() {
        let args = CliArgs::parse_from(["vitrine", "cache", "flush"]);
        match args.command {
            Some(Command::Cache(CacheCommand {
                command: CacheAction::Flush { namespace },
            })) => assert!(namespace.is_none()),
            _ => panic!("Expected Cache Flush command"),
        }
    }

    #[test]
    fn test_cache_flush_namespace() {
        let args = CliArgs::parse_from(["vitrine", "cache", "flush", "--namespace", "search"]);
        match args.command {
            Some(Command::Cache(CacheCommand {
                command: CacheAction::Flush { namespace },
            })) => assert_eq!(namespace.as_deref(), Some("search")),
            _ => panic!("Expected Cache Flush command"),
        }
    }

    // ------------------------------------------------------------------------
    // config
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_get_command() {
        let args = CliArgs::parse_from(["vitrine", "config", "get", "ranking.top_k"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Get { key },
            })) => assert_eq!(key, "ranking.top_k"),
            _ => panic!("Expected Config Get command"),
        }
    }

    #[test]
    fn test_config_init_force() {
        let args = CliArgs::parse_from(["vitrine", "config", "init", "--force"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Init { file, force },
            })) => {
                assert!(file.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_export_docker_env() {
        let args = CliArgs::parse_from(["vitrine", "config", "export", "--docker-env"]);
        assert!(matches!(
            args.command,
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Export { docker_env: true }
            }))
        ));
    }
}
