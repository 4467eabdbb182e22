//! The `vitrine` command-line application.
//!
//! Loads [`VitrineConfig`], opens the persisted index, assembles a
//! [`RankingPipeline`](vitrine_rank::RankingPipeline) and dispatches
//! subcommands. Handlers return values and the application prints them as
//! pretty JSON, so every command is testable without capturing stdout.

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod index_handlers;
pub mod search_handlers;

pub use app::{Vitrine, build_encoder};
pub use cli::CliArgs;
pub use config::VitrineConfig;
