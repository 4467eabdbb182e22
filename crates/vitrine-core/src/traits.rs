//! Core traits for Vitrine deployment abstraction.
//!
//! [`ConfigProvider`] abstracts where a deployment keeps its data so the
//! CLI and embedding applications can resolve index locations the same way.

use std::path::PathBuf;

use crate::Result;

/// Trait for deployment-specific configuration.
///
/// # Bounds
///
/// - `Send + Sync`: Configuration must be shareable across threads
/// - `Clone`: Configuration can be duplicated for passing to subsystems
/// - `'static`: Configuration lifetime is not borrowed
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use vitrine_core::traits::ConfigProvider;
/// use vitrine_core::Result;
///
/// #[derive(Clone)]
/// struct ShopConfig {
///     data_dir: PathBuf,
/// }
///
/// impl ConfigProvider for ShopConfig {
///     fn project_name(&self) -> &str {
///         "shop"
///     }
///
///     fn base_path(&self) -> Result<PathBuf> {
///         Ok(self.data_dir.clone())
///     }
///
///     fn index_path(&self) -> Result<PathBuf> {
///         Ok(self.data_dir.join("index"))
///     }
/// }
/// ```
pub trait ConfigProvider: Send + Sync + Clone + 'static {
    /// The project name, used for env var prefixes and default paths.
    fn project_name(&self) -> &str;

    /// Base path for all project data.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be determined.
    fn base_path(&self) -> Result<PathBuf>;

    /// Directory holding the persisted vector index and its metadata sidecar.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be resolved.
    fn index_path(&self) -> Result<PathBuf>;
}
