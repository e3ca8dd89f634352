use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chugsplash::DeploymentConfig;

const FILE_SCHEME: &str = "file://";

/// Reasons a config could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The fetch did not complete in time.
    #[error("fetching {uri} timed out after {timeout:?}")]
    ConfigFetchTimeout {
        /// The config URI.
        uri: String,
        /// The timeout.
        timeout: Duration,
    },
    /// No config is stored under the URI.
    #[error("config {0} not found")]
    NotFound(String),
    /// The source cannot resolve URIs of this scheme.
    #[error("unsupported config URI {0}")]
    UnsupportedUri(String),
    /// Reading the config failed.
    #[error("failed to read {uri}: {source}")]
    Io {
        /// The config URI.
        uri: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The config is not valid JSON.
    #[error("invalid config {uri}: {source}")]
    Parse {
        /// The config URI.
        uri: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// Whether a later fetch of the same URI may succeed.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConfigFetchTimeout { .. } | Self::Io { .. })
    }
}

/// Resolves the config URI of a proposal into the config it was built from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetches the config stored under `uri`.
    async fn fetch(&self, uri: &str) -> Result<DeploymentConfig, SourceError>;
}

/// Fetches the config under `uri`, giving up after `timeout`.
pub async fn fetch_config<S>(
    source: &S,
    uri: &str,
    timeout: Duration,
) -> Result<DeploymentConfig, SourceError>
where
    S: ConfigSource + ?Sized,
{
    tokio::time::timeout(timeout, source.fetch(uri))
        .await
        .map_err(|_| SourceError::ConfigFetchTimeout { uri: uri.to_string(), timeout })?
}

/// Reads JSON configs from the file system.
///
/// Accepts `file://` URIs and plain paths. Relative paths resolve against the root when one is
/// set.
#[derive(Clone, Debug, Default)]
pub struct FileSource {
    root: Option<PathBuf>,
}

impl FileSource {
    /// Resolves relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    fn path(&self, uri: &str) -> Result<PathBuf, SourceError> {
        let path = match uri.strip_prefix(FILE_SCHEME) {
            Some(path) => path,
            None if uri.contains("://") => return Err(SourceError::UnsupportedUri(uri.to_string())),
            None => uri,
        };
        let path = Path::new(path);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch(&self, uri: &str) -> Result<DeploymentConfig, SourceError> {
        let path = self.path(uri)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(uri.to_string()))
            }
            Err(source) => return Err(SourceError::Io { uri: uri.to_string(), source }),
        };
        serde_json::from_str(&raw)
            .map_err(|source| SourceError::Parse { uri: uri.to_string(), source })
    }
}

/// Serves configs from memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    configs: HashMap<String, DeploymentConfig>,
}

impl MemorySource {
    /// Stores `config` under `uri`.
    pub fn insert(&mut self, uri: impl Into<String>, config: DeploymentConfig) {
        self.configs.insert(uri.into(), config);
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with_config(mut self, uri: impl Into<String>, config: DeploymentConfig) -> Self {
        self.insert(uri, config);
        self
    }
}

#[async_trait]
impl ConfigSource for MemorySource {
    async fn fetch(&self, uri: &str) -> Result<DeploymentConfig, SourceError> {
        self.configs.get(uri).cloned().ok_or_else(|| SourceError::NotFound(uri.to_string()))
    }
}
