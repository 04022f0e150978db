//! Dataset configuration
//!
//! A [`DatasetConfig`] is built once and never mutated afterwards. It is shared by
//! every operation that needs to know where the cache lives or where local files are.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_ENV: &str = "CROISSANT_CACHE";

/// Environment variable holding the HTTP basic-auth user name
pub const BASIC_AUTH_USERNAME_ENV: &str = "CROISSANT_BASIC_AUTH_USERNAME";

/// Environment variable holding the HTTP basic-auth password
pub const BASIC_AUTH_PASSWORD_ENV: &str = "CROISSANT_BASIC_AUTH_PASSWORD";

/// How the execution engine walks the operation graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Stream when the plan is a single chain, materialize otherwise
    #[default]
    Auto,
    /// Always materialize every intermediate result
    Sequential,
    /// Always stream; fails on plans that are not a single chain
    Streaming,
}

/// Immutable configuration of a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetConfig {
    cache_dir: PathBuf,
    mapping: BTreeMap<String, PathBuf>,
    folder: Option<PathBuf>,
    live_dataset: bool,
    max_parallel_downloads: Option<usize>,
    strategy: ExecutionStrategy,
    basic_auth: Option<(String, String)>,
}

impl DatasetConfig {
    /// Start building a configuration
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::new()
    }

    /// Configuration read from the environment
    pub fn from_env() -> Self {
        DatasetConfigBuilder::new().basic_auth_from_env().build()
    }

    /// Root of the on-disk cache
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding raw downloads
    pub fn download_dir(&self) -> PathBuf {
        self.cache_dir.join("download")
    }

    /// Directory holding extracted archives
    pub fn extract_dir(&self) -> PathBuf {
        self.cache_dir.join("extract")
    }

    /// Local overrides for named resources
    pub fn mapping(&self) -> &BTreeMap<String, PathBuf> {
        &self.mapping
    }

    /// Base folder for relative content URLs and local file sets
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Whether checksums may be omitted on file objects
    pub fn live_dataset(&self) -> bool {
        self.live_dataset
    }

    /// Cap on concurrent downloads, if any
    pub fn max_parallel_downloads(&self) -> Option<usize> {
        self.max_parallel_downloads
    }

    /// Configured execution strategy
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// Credentials for HTTP basic authentication
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        self.basic_auth
            .as_ref()
            .map(|(user, password)| (user.as_str(), password.as_str()))
    }

    /// Copy of this configuration with another base folder
    ///
    /// Used when the manifest is loaded from a path and no folder was given.
    #[must_use]
    pub fn with_default_folder(&self, folder: &Path) -> Self {
        let mut config = self.clone();
        if config.folder.is_none() {
            config.folder = Some(folder.to_path_buf());
        }
        config
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfigBuilder::new().build()
    }
}

fn default_cache_dir() -> PathBuf {
    if let Some(dir) = env::var_os(CACHE_ENV) {
        return PathBuf::from(dir);
    }
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map_or_else(env::temp_dir, PathBuf::from);
    home.join(".cache").join("croissant")
}

/// Builder for [`DatasetConfig`]
#[derive(Debug, Default)]
pub struct DatasetConfigBuilder {
    cache_dir: Option<PathBuf>,
    mapping: BTreeMap<String, PathBuf>,
    folder: Option<PathBuf>,
    live_dataset: bool,
    max_parallel_downloads: Option<usize>,
    strategy: ExecutionStrategy,
    basic_auth: Option<(String, String)>,
}

impl DatasetConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache root
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Map a FileObject/FileSet name to a local path
    #[must_use]
    pub fn map(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.mapping.insert(name.into(), path.into());
        self
    }

    /// Replace the whole mapping
    #[must_use]
    pub fn mapping(mut self, mapping: BTreeMap<String, PathBuf>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Set the base folder for local resources
    #[must_use]
    pub fn folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Mark the dataset as live (checksums cannot be known in advance)
    #[must_use]
    pub fn live_dataset(mut self, live: bool) -> Self {
        self.live_dataset = live;
        self
    }

    /// Cap the number of concurrent downloads
    #[must_use]
    pub fn max_parallel_downloads(mut self, workers: usize) -> Self {
        self.max_parallel_downloads = Some(workers);
        self
    }

    /// Force an execution strategy
    #[must_use]
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set HTTP basic-auth credentials
    #[must_use]
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Read HTTP basic-auth credentials from the environment, if both are set
    #[must_use]
    pub fn basic_auth_from_env(mut self) -> Self {
        if let (Ok(user), Ok(password)) = (
            env::var(BASIC_AUTH_USERNAME_ENV),
            env::var(BASIC_AUTH_PASSWORD_ENV),
        ) {
            self.basic_auth = Some((user, password));
        }
        self
    }

    /// Build the configuration
    pub fn build(self) -> DatasetConfig {
        DatasetConfig {
            cache_dir: self.cache_dir.unwrap_or_else(default_cache_dir),
            mapping: self.mapping,
            folder: self.folder,
            live_dataset: self.live_dataset,
            max_parallel_downloads: self.max_parallel_downloads,
            strategy: self.strategy,
            basic_auth: self.basic_auth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_layout() {
        let config = DatasetConfig::builder().cache_dir("/tmp/cache").build();
        assert_eq!(config.download_dir(), PathBuf::from("/tmp/cache/download"));
        assert_eq!(config.extract_dir(), PathBuf::from("/tmp/cache/extract"));
    }

    #[test]
    fn test_builder_values() {
        let config = DatasetConfig::builder()
            .cache_dir("/c")
            .map("archive.zip", "/data/archive.zip")
            .folder("/manifests")
            .live_dataset(true)
            .max_parallel_downloads(0)
            .strategy(ExecutionStrategy::Sequential)
            .basic_auth("user", "secret")
            .build();

        assert_eq!(
            config.mapping().get("archive.zip"),
            Some(&PathBuf::from("/data/archive.zip"))
        );
        assert_eq!(config.folder(), Some(Path::new("/manifests")));
        assert!(config.live_dataset());
        assert_eq!(config.max_parallel_downloads(), Some(0));
        assert_eq!(config.strategy(), ExecutionStrategy::Sequential);
        assert_eq!(config.basic_auth(), Some(("user", "secret")));
    }

    #[test]
    fn test_default_folder_does_not_override() {
        let config = DatasetConfig::builder().cache_dir("/c").folder("/a").build();
        let config = config.with_default_folder(Path::new("/b"));
        assert_eq!(config.folder(), Some(Path::new("/a")));

        let config = DatasetConfig::builder().cache_dir("/c").build();
        let config = config.with_default_folder(Path::new("/b"));
        assert_eq!(config.folder(), Some(Path::new("/b")));
    }
}
