//! Downloads into the content-addressed cache
//!
//! The actual fetching goes through a [`Transport`], so that datasets can be read
//! with or without network support and tests can run offline. Cache entries are
//! named after the SHA-256 of their URL and are only ever created by an atomic
//! rename, so an existing entry is always complete.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Error, Result};

const URL_SCHEMES: [&str; 3] = ["http://", "https://", "ftp://"];

/// Whether `value` looks like a remote URL rather than a local path
pub fn is_url(value: &str) -> bool {
    URL_SCHEMES.iter().any(|scheme| value.starts_with(scheme))
}

/// Stable cache key of a URL: hex-encoded SHA-256
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Fetches the content behind a URL into a local file
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Write the content of `url` into `dest`, which already exists and is empty
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Transport used when no network support is compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTransport;

impl Transport for NoTransport {
    fn fetch(&self, url: &str, _dest: &Path) -> Result<()> {
        Err(Error::Unsupported(format!(
            "cannot download {url}: no HTTP transport is available. \
             Enable the `http` feature or map the file to a local path"
        )))
    }
}

/// Blocking HTTP(S) transport
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    basic_auth: Option<(String, String)>,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Create a transport, optionally sending basic-auth credentials
    pub fn new(basic_auth: Option<(String, String)>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("croissant/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, basic_auth })
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        let mut response = request.send()?.error_for_status()?;
        let mut file = fs::File::create(dest)?;
        let bytes = response.copy_to(&mut file)?;
        debug!(url = %url, bytes, "fetched over HTTP");
        Ok(())
    }
}

/// Best transport compiled into this build
pub fn default_transport(basic_auth: Option<(&str, &str)>) -> Result<Arc<dyn Transport>> {
    #[cfg(feature = "http")]
    {
        let credentials = basic_auth.map(|(user, password)| (user.to_string(), password.to_string()));
        Ok(Arc::new(HttpTransport::new(credentials)?))
    }
    #[cfg(not(feature = "http"))]
    {
        let _ = basic_auth;
        Ok(Arc::new(NoTransport))
    }
}

/// Downloads URLs into `download_dir`
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    download_dir: PathBuf,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}

impl Downloader {
    /// Create a downloader writing into `download_dir`
    pub fn new(transport: Arc<dyn Transport>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            download_dir: download_dir.into(),
        }
    }

    /// Directory holding the downloads
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Where the content of `url` is cached
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.download_dir.join(format!("croissant-{}", cache_key(url)))
    }

    /// Download `url` unless it is already cached, and return the cached path
    pub fn download(&self, url: &str) -> Result<PathBuf> {
        let dest = self.cache_path(url);
        if dest.exists() {
            debug!(url = %url, path = %dest.display(), "download cache hit");
            return Ok(dest);
        }
        fs::create_dir_all(&self.download_dir)?;
        let partial = tempfile::NamedTempFile::new_in(&self.download_dir)?;
        self.transport
            .fetch(url, partial.path())
            .map_err(|e| match e {
                Error::Download { .. } | Error::Unsupported(_) => e,
                other => Error::Download {
                    url: url.to_string(),
                    reason: other.to_string(),
                },
            })?;
        if let Err(e) = partial.persist(&dest) {
            // Another writer may have won the race with a complete file.
            if !dest.exists() {
                return Err(Error::Io(e.error));
            }
        }
        info!(url = %url, path = %dest.display(), "file downloaded");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/a.csv"));
        assert!(is_url("http://example.com"));
        assert!(!is_url("data/a.csv"));
        assert!(!is_url("/abs/a.csv"));
    }

    #[test]
    fn test_cache_key_is_stable() {
        assert_eq!(cache_key("https://a"), cache_key("https://a"));
        assert_ne!(cache_key("https://a"), cache_key("https://b"));
        assert_eq!(cache_key("https://a").len(), 64);
    }

    #[test]
    fn test_download_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockTransport::new();
        transport
            .expect_fetch()
            .with(eq("https://host/data.csv"), mockall::predicate::always())
            .times(1)
            .returning(|_, dest| {
                fs::write(dest, b"a,b\n1,2\n")?;
                Ok(())
            });
        let downloader = Downloader::new(Arc::new(transport), dir.path().join("download"));

        let first = downloader.download("https://host/data.csv").unwrap();
        let second = downloader.download("https://host/data.csv").unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&first).unwrap(), b"a,b\n1,2\n");
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("croissant-"));
    }

    #[test]
    fn test_failed_download_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = MockTransport::new();
        transport.expect_fetch().returning(|_, _| {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )))
        });
        let downloader = Downloader::new(Arc::new(transport), dir.path());
        let err = downloader.download("https://host/x").unwrap_err();
        assert!(matches!(err, Error::Download { .. }));
        assert!(!downloader.cache_path("https://host/x").exists());
    }

    #[test]
    fn test_no_transport_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Arc::new(NoTransport), dir.path());
        assert!(matches!(
            downloader.download("https://host/x"),
            Err(Error::Unsupported(_))
        ));
    }
}
